//! Sync commands - pull entities from the remote CRM into the local mirror.

use std::sync::Arc;
use std::time::Duration;

use crmsync::http::ReqwestTransport;
use crmsync::{
    CrmClient, CrmOptions, EntityKind, GovernorSettings, RateGovernor, ResilientTransport,
    StaticToken, SyncContext, SyncReport, SyncSettings,
};
use tokio_util::sync::CancellationToken;

use crate::config::Config;

pub(crate) async fn handle_sync(
    config: &Config,
    entity: &str,
    full: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let base_url = config
        .crm
        .base_url
        .clone()
        .ok_or("no CRM base URL configured; set crm.base_url in crmsync.toml")?;
    let token = config
        .crm
        .token
        .clone()
        .ok_or("no CRM token configured; set crm.token or CRMSYNC_CRM_TOKEN")?;
    let database_url = config
        .database_url()
        .ok_or("could not determine database location")?;

    let db = crmsync::connect_and_migrate(&database_url).await?;

    let cancel = CancellationToken::new();
    let governor = RateGovernor::new(GovernorSettings {
        max_requests_per_second: config.rate.max_requests_per_second,
        adaptive: config.rate.adaptive,
    });
    let transport = ResilientTransport::with_cancellation(
        Arc::new(ReqwestTransport::with_timeout(Duration::from_secs(
            config.crm.timeout_secs,
        ))?),
        governor.clone(),
        cancel.clone(),
    );
    let client = CrmClient::new(
        transport,
        Arc::new(StaticToken(token)),
        CrmOptions {
            base_url,
            page_size: config.crm.page_size,
            request_delay_ms: config.crm.request_delay_ms,
        },
    );

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nShutdown requested, finishing current batch...");
            ctrl_c_cancel.cancel();
        }
    });

    let ctx = SyncContext {
        db,
        client,
        settings: SyncSettings {
            events_lookback_months: config.sync.events_lookback_months,
            messages_lookback_months: config.sync.messages_lookback_months,
        },
        cancel,
    };

    if entity == "all" {
        let mut total = SyncReport::default();
        for kind in EntityKind::ALL {
            if ctx.cancel.is_cancelled() {
                println!("Stopped before {kind}.");
                break;
            }
            let report = crmsync::sync::run_entity(&ctx, kind, full).await?;
            print_report(kind.as_str(), &report);
            total.absorb(report);
        }
        print_report("total", &total);
    } else {
        let kind: EntityKind = entity.parse()?;
        let report = crmsync::sync::run_entity(&ctx, kind, full).await?;
        print_report(kind.as_str(), &report);
    }

    let status = governor.status().await;
    println!(
        "Rate: {} requests, {} throttle hits ({:.1}%), state {}, delay {:.0}ms",
        status.total_requests,
        status.total_throttle_hits,
        status.hit_rate_percent,
        status.state.as_str(),
        status.current_delay_ms,
    );

    Ok(())
}

fn print_report(label: &str, report: &SyncReport) {
    println!(
        "{label}: {} processed, {} written, {} unchanged, {} decode errors",
        report.processed, report.written, report.unchanged, report.decode_errors,
    );
}
