mod cancellation;
mod config;
mod error;
mod extractor;
mod http_client;
mod integration_keyring;
mod model;
mod protocol;
mod resolution;
mod sources;

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use log::{debug, info, warn};
use tokio::sync::broadcast::{self, error::RecvError};

use cancellation::CancelToken;
use config::{Config, CredentialsConfig};
use http_client::RateLimitedClient;
use model::ArtistQuery;
use protocol::{Message, ResolutionMessage, SourceOutcome};
use resolution::{resolve_batch, ResolutionEngine};
use sources::SourceRegistry;

/// Parses `Name` or `Name | genre, genre` into a query.
fn parse_query(line: &str) -> Option<ArtistQuery> {
    let (name, hints) = match line.split_once('|') {
        Some((name, hints)) => (name, hints),
        None => (line, ""),
    };
    let name = name.trim();
    if name.is_empty() || name.starts_with('#') {
        return None;
    }
    let hints = hints
        .split(',')
        .map(str::trim)
        .filter(|hint| !hint.is_empty())
        .map(str::to_string)
        .collect();
    Some(ArtistQuery::new(name).with_genre_hints(hints))
}

fn read_queries() -> io::Result<Vec<ArtistQuery>> {
    let from_args: Vec<ArtistQuery> = std::env::args()
        .skip(1)
        .filter_map(|arg| parse_query(&arg))
        .collect();
    if !from_args.is_empty() {
        return Ok(from_args);
    }
    let mut queries = Vec::new();
    for line in io::stdin().lock().lines() {
        if let Some(query) = parse_query(&line?) {
            queries.push(query);
        }
    }
    Ok(queries)
}

/// Fills empty credentials from the OS keyring.
fn resolve_credentials(configured: &CredentialsConfig) -> CredentialsConfig {
    CredentialsConfig {
        spotify_client_id: integration_keyring::resolve_secret(
            &configured.spotify_client_id,
            "spotify",
            "client_id",
        ),
        spotify_client_secret: integration_keyring::resolve_secret(
            &configured.spotify_client_secret,
            "spotify",
            "client_secret",
        ),
        perplexity_api_key: integration_keyring::resolve_secret(
            &configured.perplexity_api_key,
            "perplexity",
            "api_key",
        ),
        perplexity_model: configured.perplexity_model.clone(),
    }
}

fn spawn_progress_logger(mut bus_receiver: broadcast::Receiver<Message>) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("liner-progress".to_string())
        .spawn(move || loop {
            match bus_receiver.blocking_recv() {
                Ok(Message::Resolution(message)) => match message {
                    ResolutionMessage::PhaseChanged { artist, phase } => {
                        debug!("[{}] {}", artist, phase);
                    }
                    ResolutionMessage::SourceFinished {
                        artist,
                        source,
                        outcome: SourceOutcome::Failed { kind, message },
                    } => {
                        warn!("[{}] {} failed ({}): {}", artist, source, kind, message);
                    }
                    ResolutionMessage::SourceFinished {
                        artist,
                        source,
                        outcome,
                    } => {
                        debug!("[{}] {} -> {:?}", artist, source, outcome);
                    }
                    ResolutionMessage::Finished {
                        artist,
                        status,
                        known_fields,
                        unknown_fields,
                    } => {
                        info!(
                            "[{}] {:?}: {} fields known, {} unknown",
                            artist, status, known_fields, unknown_fields
                        );
                    }
                    ResolutionMessage::Cancelled { artist } => {
                        info!("[{}] cancelled", artist);
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Progress logger lagged on bus, skipped {} message(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    clog.parse_default_env();
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config = match dirs::config_dir() {
        Some(config_dir) => config::load_or_create(&config_dir.join("liner").join("config.toml"))?,
        None => {
            warn!("No config directory available, using defaults");
            config::sanitize_config(Config::default())
        }
    };

    let queries = read_queries()?;
    if queries.is_empty() {
        info!("No artist names given (pass them as arguments or on stdin)");
        return Ok(());
    }

    let credentials = resolve_credentials(&config.credentials);
    let client = Arc::new(RateLimitedClient::with_ureq(&config.network));
    let registry = SourceRegistry::from_config(client, &config.resolution, &credentials);

    // Bus for resolution progress
    let (bus_sender, bus_receiver) = broadcast::channel(1024);
    let progress_logger = spawn_progress_logger(bus_receiver)?;

    let engine = Arc::new(
        ResolutionEngine::new(registry, config.resolution.clone()).with_bus(bus_sender),
    );
    let records = resolve_batch(
        Arc::clone(&engine),
        queries,
        config.resolution.batch_workers,
        &CancelToken::new(),
    );
    drop(engine);
    if progress_logger.join().is_err() {
        warn!("Progress logger thread panicked");
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &records)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::parse_query;

    #[test]
    fn test_parse_query_reads_name_and_genre_hints() {
        let query = parse_query(" Genesis | progressive rock, art rock ").expect("query");
        assert_eq!(query.name, "Genesis");
        assert_eq!(
            query.genre_hints,
            vec!["progressive rock".to_string(), "art rock".to_string()]
        );
        assert!(parse_query("   ").is_none());
        assert!(parse_query("# comment").is_none());
        assert_eq!(
            parse_query("John Coltrane").map(|query| query.genre_hints.len()),
            Some(0)
        );
    }
}
