use clap::Args;

use crate::dns::blocklist_service::BlocklistService;

/// Refreshes the blocklist tables from their configured sources
#[derive(Args, Debug)]
pub struct Command;

impl Command {
    pub async fn run(self, config: crate::config::Config) {
        let database = config
            .database
            .build()
            .await
            .expect("unable to connect to database");
        crate::service::database::migrate(&database)
            .await
            .expect("unable to migrate the database");

        let service = config.blocklist.build(database);
        match service.import().await {
            Ok((inserted, deleted)) => tracing::info!(
                "inserted {inserted} new domains and deleted {deleted} existing domains"
            ),
            Err(error) => tracing::error!("unable to import blocklists: {error:?}"),
        }
    }
}
