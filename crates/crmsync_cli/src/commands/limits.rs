//! Show the effective request-rate configuration.

use crmsync::{GovernorSettings, RateGovernor};

use crate::config::Config;

pub(crate) async fn handle_limits(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    // A fresh governor applies the same clamping the sync path does, so the
    // numbers printed here are the ones a run would actually use.
    let governor = RateGovernor::new(GovernorSettings {
        max_requests_per_second: config.rate.max_requests_per_second,
        adaptive: config.rate.adaptive,
    });
    let status = governor.status().await;

    println!("Request-rate limits:");
    println!(
        "  max requests/second: {}",
        status.max_requests_per_second
    );
    println!(
        "  adaptive delay:      {}",
        if status.adaptive { "enabled" } else { "disabled" }
    );
    println!("  base delay:          {:.0}ms", status.current_delay_ms);
    if config.rate.max_requests_per_second != status.max_requests_per_second {
        println!(
            "  (configured value {} clamped to the remote's ceiling)",
            config.rate.max_requests_per_second
        );
    }

    Ok(())
}
