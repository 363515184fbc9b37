use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;

use replication_monitor::checker::ReplicationChecker;
use replication_monitor::cli::Cli;
use replication_monitor::config::GlobalSettings;
use replication_monitor::db::MySqlConnector;
use replication_monitor::logging::init_logging;
use replication_monitor::notify::{MailTransport, SmtpMailer};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    let settings = GlobalSettings::load(&cli.config).unwrap_or_else(|err| {
        tracing::error!("{}", err);
        std::process::exit(1);
    });

    tracing::info!(
        "Loaded {} database(s) for {} from {}",
        settings.databases.len(),
        settings.server_name,
        cli.config.display()
    );

    if settings.notifications.is_empty() {
        tracing::warn!("No email_configs or sms_configs; lag will be logged but not sent");
    }

    // Without email_configs there are no channels, so the endpoint is never used.
    let transport: Arc<dyn MailTransport> = Arc::new(match &settings.notifications.email {
        Some(email) => SmtpMailer::from_config(email),
        None => SmtpMailer::new("localhost", 25),
    });

    let checker = ReplicationChecker::new(settings, Arc::new(MySqlConnector::new()), transport);
    let summary = checker.run().await;

    if cli.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(err) => tracing::error!("Cannot render summary as JSON: {}", err),
        }
    }
}
