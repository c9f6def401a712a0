pub mod encode;
pub mod grpc;
pub mod http;
