pub mod metric;
pub mod request;
