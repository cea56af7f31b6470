//! Status command implementation
//!
//! Reads both ledger replicas without modifying either and shows what a delta
//! run would resume from.

use super::exit_code;
use crate::adapters::factory::create_clients;
use crate::config::resolve_config;
use crate::core::state::{merge, LedgerStore, MergeOutcome};

/// Execute the status command
pub async fn execute(config_file: Option<&str>) -> anyhow::Result<i32> {
    tracing::info!("Checking export status");

    let config = match resolve_config(config_file).await {
        Ok(c) => c,
        Err(e) => {
            println!("Failed to load configuration");
            println!("   Error: {e}");
            return Ok(exit_code::CONFIGURATION);
        }
    };

    let clients = match create_clients(&config) {
        Ok(c) => c,
        Err(e) => {
            println!("Failed to connect to Cloud Storage");
            println!("   Error: {e}");
            return Ok(exit_code::CONNECTION);
        }
    };

    let paths = config.paths();
    let ledger_store = LedgerStore::new(&paths, clients.store);
    let local = ledger_store.load_local().await;
    let remote = ledger_store.load_remote().await;

    println!("Export Status: {}", config.table_ref());
    println!();
    println!("  Local replica:  {} ({})", local.describe(), ledger_store.local_path().display());
    println!(
        "  Remote replica: {} (gs://{}/{})",
        remote.describe(),
        paths.bucket(),
        ledger_store.remote_object()
    );

    let outcome = merge(local, remote);
    print!("{}", render_outcome(&outcome));
    Ok(exit_code::SUCCESS)
}

/// Text shown for the merged ledger
pub fn render_outcome(outcome: &MergeOutcome) -> String {
    let mut out = String::new();
    match outcome.source {
        Some(source) => out.push_str(&format!("  Selected replica: {source}\n")),
        None => out.push_str("  Selected replica: none (no usable ledger)\n"),
    }
    out.push_str(&format!("  Resume date: {}\n\n", outcome.resume_date));

    if outcome.ledger.is_empty() {
        out.push_str("No export history found.\n");
        return out;
    }

    out.push_str(&format!(
        "{:<12} {:<10} {:>16} {:<25}\n",
        "Partition", "Status", "Bytes", "Started At"
    ));
    out.push_str(&format!("{}\n", "-".repeat(66)));
    for record in outcome.ledger.sorted_records() {
        let bytes = record
            .bytes_written
            .map(|b| b.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<12} {:<10} {:>16} {:<25}\n",
            record.partition.as_str(),
            record.status.to_string(),
            bytes,
            record.run_timestamp.format("%Y-%m-%d %H:%M:%S%.3f")
        ));
    }

    let incomplete = outcome.ledger.incomplete_partitions();
    if !incomplete.is_empty() {
        out.push_str(&format!(
            "\n{} partition(s) without a success record\n",
            incomplete.len()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{ReplicaState, StatusLedger};
    use crate::domain::PartitionKey;

    fn key(s: &str) -> PartitionKey {
        PartitionKey::new(s).unwrap()
    }

    #[test]
    fn test_render_outcome_lists_partitions_ascending() {
        let mut ledger = StatusLedger::new();
        ledger.mark_started(key("20240102"));
        ledger.mark_started(key("20240101"));
        ledger.mark_success(&key("20240101"), 2048).unwrap();
        let local = ReplicaState::Loaded(ledger);

        let text = render_outcome(&merge(local, ReplicaState::Missing));
        assert!(text.contains("Selected replica: local"));
        assert!(text.contains("Resume date: 20240102"));
        let first = text.find("20240101").unwrap();
        let second = text.rfind("20240102").unwrap();
        assert!(first < second);
        assert!(text.contains("2048"));
        assert!(text.contains("1 partition(s) without a success record"));
    }

    #[test]
    fn test_render_outcome_without_history() {
        let text = render_outcome(&merge(ReplicaState::Missing, ReplicaState::Missing));
        assert!(text.contains("none (no usable ledger)"));
        assert!(text.contains("Resume date: 19990101"));
        assert!(text.contains("No export history found."));
    }
}
