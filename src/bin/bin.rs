use anyhow::Result;
use keycloak::{
    input,
    logger::RunLog,
    runner::{run_batch, Batch, ErrorPolicy, RunState},
    Client,
};
use std::{path::PathBuf, process, time::Duration};
use structopt::StructOpt;

/// Send an UPDATE_PASSWORD action email to every user id listed in a file,
/// one request at a time with a fixed pause between calls.
#[derive(StructOpt)]
struct Options {
    /// Keycloak server base url
    #[structopt(long, env = "KEYCLOAK_BASE_URL")]
    base_url: String,
    /// Admin API bearer token
    #[structopt(long, env = "KEYCLOAK_AUTH_TOKEN", hide_env_values = true)]
    auth_token: String,
    /// Realm the users belong to
    #[structopt(long, env = "KEYCLOAK_REALM", default_value = "haulmer-users")]
    realm: String,
    /// File with one user id per line
    #[structopt(long, env = "USERS_FILE", default_value = "users.txt", parse(from_os_str))]
    users_file: PathBuf,
    /// Pause between calls, in milliseconds
    #[structopt(long, env = "DELAY_MS", default_value = "3000")]
    delay_ms: u64,
    /// Run transcript file, appended to across runs
    #[structopt(long, env = "LOG_FILE", default_value = "process-log.txt", parse(from_os_str))]
    log_file: PathBuf,
    /// What to do when one request fails
    #[structopt(long, env = "ON_ERROR", default_value = "stop", possible_values = &["stop", "skip"])]
    on_error: ErrorPolicy,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load from .env file if it is present
    dotenv::dotenv().ok();
    // Initialize logging
    env_logger::init();
    // Get command line arguments (each with an environment fallback)
    let options = Options::from_args();

    let mut log = RunLog::open(&options.log_file)?;
    log.line("=== Starting user processing ===")?;

    // Read and deduplicate the user ids before touching the network
    let users = match input::load_user_ids(&options.users_file) {
        Ok(users) => users,
        Err(error) => {
            log.line(format!("FATAL: {}", error))?;
            process::exit(1);
        }
    };
    log.line(format!("Found {} ids in the file", users.total_read))?;
    if users.duplicates > 0 {
        log.line(format!("Discarded {} duplicate ids", users.duplicates))?;
    }
    log.line(format!("Processing {} unique users", users.ids.len()))?;

    let client = Client::new(&options.base_url, &options.realm, &options.auth_token)?;
    let batch = Batch::new(users.ids, options.on_error);
    let delay = Duration::from_millis(options.delay_ms);
    let report = run_batch(batch, &mut log, delay, move |user_id| {
        let client = client.clone();
        async move { client.execute_actions_email(&user_id).await }
    })
    .await?;

    log.line("=== Final summary ===")?;
    log.line(format!("Total processed: {}", report.summary.attempted))?;
    log.line(format!("Successes: {}", report.summary.succeeded))?;
    log.line(format!("Errors: {}", report.summary.failed))?;

    if report.summary.failed > 0 {
        if report.state == RunState::Aborted {
            log.line("Processing stopped due to an error")?;
        } else {
            log.line("Processing finished with errors")?;
        }
        process::exit(1);
    }
    log.line("Processing completed successfully")?;

    Ok(())
}
