//! Load Testing Tool
//!
//! Fires concurrent transfers at in-memory back-ends and reports how many
//! settled, how many hit a held lease and how many events were published.
//!
//! Run with: cargo run --bin load_test --release -- --transfers 1000 --accounts 10

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use tokio::task::JoinSet;
use uuid::Uuid;

use roundup_settlement::app::{self, Backends};
use roundup_settlement::domain::{PAYMENT_COMPLETED_TOPIC, TRANSACTION_EVENTS_TOPIC};
use roundup_settlement::event_log::InMemoryEventLog;
use roundup_settlement::handlers::TransferCommand;
use roundup_settlement::{AppError, Config, OperationContext};

fn arg_or(args: &[String], flag: &str, default: usize) -> usize {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let transfer_count = arg_or(&args, "--transfers", 1000);
    let account_count = arg_or(&args, "--accounts", 10).max(1);

    println!(
        "Load Test - {} transfers over {} source accounts",
        transfer_count, account_count
    );

    let config = Config::default();
    let log = InMemoryEventLog::new(config.log_partitions);
    let backends = Backends {
        log: Arc::new(log.clone()),
        ..Backends::in_memory(config.log_partitions)
    };
    let state = app::build_state(&config, &backends);

    let accounts: Vec<(Uuid, Uuid)> = (0..account_count)
        .map(|_| (Uuid::new_v4(), Uuid::new_v4()))
        .collect();

    let start = Instant::now();
    let mut tasks = JoinSet::new();

    for i in 0..transfer_count {
        let (user_id, from_account_id) = accounts[i % account_count];
        let transfers = state.transfers.clone();
        tasks.spawn(async move {
            let command = TransferCommand::new(
                from_account_id,
                Uuid::new_v4(),
                format!("Recipient {}", i),
                Decimal::from(1000 + (i % 9000) as i64),
            );
            let context = OperationContext::new()
                .with_request_user(user_id)
                .with_correlation_id(Uuid::new_v4());
            transfers.execute(command, &context).await
        });
    }

    let mut completed = 0usize;
    let mut contended = 0usize;
    let mut failed = 0usize;

    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(_) => completed += 1,
            Err(AppError::SettlementInProgress) => contended += 1,
            Err(e) => {
                failed += 1;
                eprintln!("Transfer failed: {}", e);
            }
        }
    }

    let elapsed = start.elapsed();
    let rate = transfer_count as f64 / elapsed.as_secs_f64();

    let payment_events = log.record_count(PAYMENT_COMPLETED_TOPIC).await;
    let transaction_events = log.record_count(TRANSACTION_EVENTS_TOPIC).await;

    println!("\n=== Load Test Results ===");
    println!("Total transfers: {}", transfer_count);
    println!("Completed: {}", completed);
    println!("Rejected (lease held): {}", contended);
    println!("Failed: {}", failed);
    println!("Events published: {}", payment_events + transaction_events);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Rate: {:.0} transfers/sec", rate);

    if payment_events != completed || transaction_events != completed {
        anyhow::bail!(
            "event count mismatch: {} completed, {} payment events, {} transaction events",
            completed,
            payment_events,
            transaction_events
        );
    }

    Ok(())
}
