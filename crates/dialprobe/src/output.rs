use dialprobe_probe::dial::ConnState;
use dialprobe_probe::handler::CheckOutcome;
use owo_colors::OwoColorize;

pub fn print_outcome_human(outcome: &CheckOutcome) {
    let state = match outcome.state {
        ConnState::Up => "UP".green().to_string(),
        ConnState::Down => "DOWN".red().to_string(),
    };
    println!(
        "{} {} {} {} latency={:.2}ms accepted={}",
        outcome.service.cyan(),
        outcome.environment,
        outcome.endpoint,
        state,
        outcome.latency_ms,
        outcome.ack.accepted
    );
    println!("{}", outcome.message);
}

pub fn print_outcome(outcome: &CheckOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        print_outcome_human(outcome);
    }
    Ok(())
}
