use std::time::Duration as StdDuration;

use chrono::Duration;
use log::{error, info};
use mongodb::{options::ClientOptions, Client as MongoClient};
use rocket::futures::TryFutureExt;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::mongodb::{ensure_counters_exist, ensure_indexes_exist, Coll};
use crate::store::MongoStore;
use crate::voting::VotingService;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    voter_population: u64,
    storage_timeout: u32,
    // secrets
    jwt_secret: String,
}

impl Config {
    /// Valid lifetime of auth tokens in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Number of registered voters, against which turnout is measured.
    pub fn voter_population(&self) -> u64 {
        self.voter_population
    }

    /// Bound on any single storage call.
    pub fn storage_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.storage_timeout.into())
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places the `Client`, the `Database`,
/// the `MongoStore` and the `VotingService` built on it into managed state.
/// This fairing depends on `Config` being in managed state, and so must be
/// attached after `ConfigFairing`.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let (storage_timeout, voter_population) = match rocket.state::<Config>() {
            Some(app_config) => (app_config.storage_timeout(), app_config.voter_population()),
            None => {
                error!("Application config was not available when connecting to the database");
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");

        // Construct the connection.
        let mut options = match ClientOptions::parse(&config.db_uri).await {
            Ok(options) => options,
            Err(e) => {
                error!("Invalid database URI: {e}");
                return Err(rocket);
            }
        };
        options.connect_timeout = Some(storage_timeout);
        options.server_selection_timeout = Some(storage_timeout);
        let client = match MongoClient::with_options(options) {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // Ensure the required indexes and ID counters exist.
        let counters = Coll::from_db(&db);
        if let Err(e) = ensure_indexes_exist(&db)
            .and_then(|_| ensure_counters_exist(&counters))
            .await
        {
            error!("Failed to set up database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        let store = MongoStore::new(client.clone(), db.clone(), storage_timeout);
        let voting = VotingService::new(store.clone(), storage_timeout, voter_population);
        rocket = rocket
            .manage(client)
            .manage(db)
            .manage(store)
            .manage(voting);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "evote".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self::example_with_secret("test secret")
        }

        pub fn example_with_secret(secret: &str) -> Self {
            Self {
                auth_ttl: 3600,
                voter_population: 4,
                storage_timeout: 5,
                jwt_secret: secret.to_string(),
            }
        }
    }
}
