// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use clap::{Parser, Subcommand};
use stark_rescue::app::config::{GlobalSettings, redact_url};
use stark_rescue::app::logging::setup_logging;
use stark_rescue::common::parsing::parse_felt;
use stark_rescue::domain::constants::KNOWN_ACCOUNT_CLASS_HASHES;
use stark_rescue::domain::error::AppError;
use stark_rescue::domain::phase::Phase;
use stark_rescue::infrastructure::data::state_store::StateStore;
use stark_rescue::infrastructure::network::evm::EvmClient;
use stark_rescue::infrastructure::network::health::{self, EndpointHealth};
use stark_rescue::infrastructure::network::provider::ConnectionFactory;
use stark_rescue::infrastructure::network::starknet_client::StarknetClient;
use stark_rescue::services::discovery::{self, CalldataPattern, SearchOutcome, SearchSpace};
use stark_rescue::services::notifier::Notifier;
use stark_rescue::services::pulse::{self, PulseTargets};
use stark_rescue::services::recovery::{
    HaltReason, KernelSettings, LiveGateway, RecoveryKernel, SignerVault,
};
use stark_rescue::services::sentry::{GhostSentry, SentryConfig, SentryOutcome};
use starknet::core::types::Felt;
use alloy::primitives::B256;
use starknet::signers::SigningKey;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "stark-rescue")]
struct Cli {
    /// Path to config file (default: config.{toml,yaml,...})
    #[arg(long, global = true)]
    config: Option<String>,

    /// Never broadcast; stop before every irreversible action
    #[arg(long, global = true, default_value_t = false)]
    dry_run: bool,

    /// Allow bridge, deploy and sweep transactions to be broadcast
    #[arg(long, global = true, default_value_t = false)]
    confirm: bool,

    /// Emit JSON log lines
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or resume the recovery mission and run it
    Start {
        /// Replace a stored mission that belongs to other addresses
        #[arg(long, default_value_t = false)]
        fresh: bool,
    },
    /// Adopt a StarkGate deposit sent outside this tool and resume from it
    Track {
        /// Source-chain transaction hash of the deposit
        tx_hash: String,
        #[arg(long, default_value_t = false)]
        fresh: bool,
    },
    /// One-shot balances, deployment status, phase and provider health
    Pulse,
    /// Poll the ghost address and sweep it once funded
    Sentry {
        #[arg(long)]
        max_polls: Option<u64>,
    },
    /// Print the persisted mission
    Status,
    /// Search class hash / salt / calldata combinations for the account address
    Search {
        #[arg(long, default_value_t = 1000)]
        salt_range: u64,
        #[arg(long = "class-hash")]
        class_hashes: Vec<String>,
        /// Address to match (default: configured starknet_address)
        #[arg(long)]
        target: Option<String>,
    },
    /// Probe every configured RPC endpoint
    Health,
}

struct Clients {
    evm: EvmClient,
    starknet: StarknetClient,
}

fn build_clients(settings: &GlobalSettings) -> Result<Clients, AppError> {
    let policy = settings.pool_policy();
    let evm_pool = Arc::new(ConnectionFactory::evm_pool(&settings.evm_rpc_urls, policy)?);
    let starknet_pool = Arc::new(ConnectionFactory::starknet_pool(
        &settings.starknet_rpc_urls,
        policy,
    )?);
    tracing::info!(
        target: "rpc",
        evm = ?settings.evm_rpc_urls.iter().map(|u| redact_url(u)).collect::<Vec<_>>(),
        starknet = ?starknet_pool.labels(),
        timeout_secs = policy.request_timeout.as_secs(),
        "RPC pools ready"
    );
    Ok(Clients {
        evm: EvmClient::new(evm_pool, settings.source_chain_id),
        starknet: StarknetClient::new(starknet_pool, settings.starknet_eth_token_value()?),
    })
}

async fn probe_all(clients: &Clients) -> Vec<EndpointHealth> {
    let (mut evm, starknet) = futures::join!(
        health::probe_evm(clients.evm.pool()),
        health::probe_starknet(clients.starknet.pool())
    );
    evm.extend(starknet);
    evm
}

async fn open_kernel(
    settings: &GlobalSettings,
    fresh: bool,
    execute: bool,
    cancel: CancellationToken,
) -> Result<RecoveryKernel<LiveGateway>, AppError> {
    let vault = SignerVault::from_settings(settings);
    let source = settings
        .source_address
        .or_else(|| vault.evm_address())
        .ok_or_else(|| AppError::Config("source_address is not configured".into()))?;
    let starknet_address = settings.starknet_address_value()?;

    let store = StateStore::new(settings.state_path());
    let record = store.open_mission(source, starknet_address, fresh)?;
    let clients = build_clients(settings)?;

    match clients.evm.remote_chain_id().await {
        Ok(id) if id != settings.source_chain_id => {
            return Err(AppError::Config(format!(
                "source RPC reports chain {id}, expected {}",
                settings.source_chain_id
            )));
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(target: "rpc", error = %e, "Could not verify source chain id"),
    }

    let gateway = LiveGateway::new(
        clients.evm,
        clients.starknet,
        settings.bridge_contract_value(),
    );
    let kernel_settings = KernelSettings::from_settings(settings, execute)?;
    Ok(RecoveryKernel::new(gateway, vault, store, record, kernel_settings, cancel))
}

async fn run_kernel(
    settings: &GlobalSettings,
    mut kernel: RecoveryKernel<LiveGateway>,
) -> Result<(), AppError> {
    let notifier = Notifier::from_settings(settings);
    let halt = kernel.run().await?;
    let record = kernel.record();
    let mission = &record.mission_id;
    let message = match &halt {
        HaltReason::Terminal(Phase::MissionSuccess) => format!("Mission {mission} succeeded"),
        HaltReason::Terminal(_) => format!(
            "Mission {mission} failed: {}",
            record.failure_reason.as_deref().unwrap_or("unknown reason")
        ),
        HaltReason::Locked => format!("Mission {mission} locked: configure source_key and starknet_key"),
        HaltReason::DryRun { action } => {
            format!("Mission {mission} stopped before: {action} (rerun with --confirm)")
        }
        HaltReason::Pending { phase, reason } => {
            format!("Mission {mission} paused in {phase}: {reason} (rerun start to resume)")
        }
    };
    notifier.notify(&message).await;

    match halt {
        HaltReason::Terminal(Phase::MissionFailed) => Err(AppError::State(message)),
        HaltReason::Locked => Err(AppError::VaultLocked),
        _ => Ok(()),
    }
}

async fn run_start(
    settings: &GlobalSettings,
    fresh: bool,
    execute: bool,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let kernel = open_kernel(settings, fresh, execute, cancel).await?;
    run_kernel(settings, kernel).await
}

async fn run_track(
    settings: &GlobalSettings,
    raw_hash: &str,
    fresh: bool,
    execute: bool,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let tx_hash = raw_hash
        .trim()
        .parse::<B256>()
        .map_err(|e| AppError::Validation {
            field: "tx_hash".into(),
            message: format!("{raw_hash:?} is not a 32-byte hex hash: {e}"),
        })?;
    let mut kernel = open_kernel(settings, fresh, execute, cancel).await?;
    let phase = kernel.adopt_deposit(tx_hash).await?;
    tracing::info!(target: "kernel", tx = %tx_hash, %phase, "Tracking deposit");
    run_kernel(settings, kernel).await
}

async fn run_pulse(settings: &GlobalSettings) -> Result<(), AppError> {
    let clients = build_clients(settings)?;
    let health = probe_all(&clients).await;
    let record = StateStore::new(settings.state_path()).load().unwrap_or_else(|e| {
        tracing::warn!(target: "state", error = %e, "Recovery record unreadable");
        None
    });
    let targets = PulseTargets {
        source: settings.source_address,
        starknet: settings.starknet_address_value().ok(),
        ghost: settings.ghost_address_value().ok(),
    };
    let gateway = LiveGateway::new(
        clients.evm,
        clients.starknet,
        settings.bridge_contract_value(),
    );
    let report = pulse::collect(&gateway, &targets, record.as_ref(), &health).await;
    let text = report.render();
    println!("{text}");
    Notifier::from_settings(settings).notify(&text).await;
    Ok(())
}

async fn run_sentry(
    settings: &GlobalSettings,
    max_polls: Option<u64>,
    execute: bool,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let thresholds = settings.thresholds()?;
    let config = SentryConfig {
        ghost: settings.ghost_address_value()?,
        main_account: settings.starknet_address_value()?,
        threshold: thresholds.ghost_wei,
        sweep_reserve: thresholds.sweep_gas_reserve_wei,
        interval: settings.sentry_interval(),
        max_polls,
        execute,
    };
    let vault = SignerVault::from_settings(settings);
    let clients = build_clients(settings)?;
    let gateway = LiveGateway::new(
        clients.evm,
        clients.starknet,
        settings.bridge_contract_value(),
    );
    let notifier = Notifier::from_settings(settings);
    let sentry = GhostSentry::new(&gateway, &notifier, vault.ghost_key(), config);

    match sentry.run(cancel).await? {
        SentryOutcome::Swept { tx_hash, amount } => {
            tracing::info!(target: "sentry", tx = %format!("{tx_hash:#x}"), %amount, "Ghost swept");
        }
        SentryOutcome::Alerted { reason, .. } => {
            tracing::info!(target: "sentry", %reason, "Threshold reached; sweep not sent");
        }
        SentryOutcome::PollLimit { polls } | SentryOutcome::Cancelled { polls } => {
            tracing::info!(target: "sentry", polls, "Ghost sentry finished");
        }
    }
    Ok(())
}

fn run_status(settings: &GlobalSettings) -> Result<(), AppError> {
    let store = StateStore::new(settings.state_path());
    match store.load()? {
        Some(record) => println!("{}", pulse::render_status(&record)),
        None => println!("No mission recorded at {}", store.path().display()),
    }
    Ok(())
}

async fn run_search(
    settings: &GlobalSettings,
    salt_range: u64,
    class_hashes: Vec<String>,
    target: Option<String>,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let raw_key = settings
        .starknet_key
        .as_deref()
        .ok_or_else(|| AppError::Config("starknet_key is required for search".into()))?;
    let public_key = SigningKey::from_secret_scalar(parse_felt("starknet_key", raw_key)?)
        .verifying_key()
        .scalar();
    let target = match target {
        Some(raw) => parse_felt("target", &raw)?,
        None => settings.starknet_address_value()?,
    };
    let classes: Vec<Felt> = if class_hashes.is_empty() {
        KNOWN_ACCOUNT_CLASS_HASHES
            .iter()
            .map(|h| parse_felt("class_hash", h))
            .collect::<Result<_, _>>()?
    } else {
        class_hashes
            .iter()
            .map(|h| parse_felt("class_hash", h))
            .collect::<Result<_, _>>()?
    };

    let space = SearchSpace::new(classes, salt_range, public_key);
    let outcome = tokio::task::spawn_blocking(move || discovery::search(target, &space, &cancel))
        .await
        .map_err(|e| AppError::Unknown(anyhow::anyhow!("search task failed: {e}")))?;
    match outcome {
        SearchOutcome::Found(m) => {
            println!("account_class_hash = \"{:#x}\"", m.class_hash);
            println!("account_salt = \"{:#x}\"", m.salt);
            println!("# constructor calldata {}", m.pattern);
            if m.pattern != CalldataPattern::Key {
                tracing::warn!(
                    target: "discovery",
                    pattern = %m.pattern,
                    "Deployment only supports [pk] calldata; this account needs a custom deploy"
                );
            }
            Ok(())
        }
        SearchOutcome::NotFound { tested } => Err(AppError::Validation {
            field: "starknet_address".into(),
            message: format!("no parameters matched after {tested} combinations"),
        }),
        SearchOutcome::Cancelled { tested } => {
            println!("# search cancelled after {tested} combinations");
            Ok(())
        }
    }
}

async fn run_health(settings: &GlobalSettings) -> Result<(), AppError> {
    let clients = build_clients(settings)?;
    let reports = probe_all(&clients).await;
    println!("{}", health::render(&reports));
    for network in ["evm", "starknet"] {
        let in_network: Vec<EndpointHealth> = reports
            .iter()
            .filter(|r| r.network == network)
            .cloned()
            .collect();
        if health::healthy_count(&in_network) == 0 {
            return Err(AppError::Connection(format!(
                "no healthy {network} endpoints"
            )));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = GlobalSettings::load_with_path(cli.config.as_deref())?;
    setup_logging(
        if settings.debug { "debug" } else { "info" },
        cli.json_logs || settings.log_json,
    );

    let execute = cli.confirm && !cli.dry_run;
    if !execute {
        tracing::info!(
            target: "config",
            dry_run = cli.dry_run,
            confirm = cli.confirm,
            "Irreversible actions disabled; pass --confirm without --dry-run to broadcast"
        );
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl-C received; shutting down");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Start { fresh } => run_start(&settings, fresh, execute, cancel).await,
        Command::Track { tx_hash, fresh } => {
            run_track(&settings, &tx_hash, fresh, execute, cancel).await
        }
        Command::Pulse => run_pulse(&settings).await,
        Command::Sentry { max_polls } => run_sentry(&settings, max_polls, execute, cancel).await,
        Command::Status => run_status(&settings),
        Command::Search {
            salt_range,
            class_hashes,
            target,
        } => run_search(&settings, salt_range, class_hashes, target, cancel).await,
        Command::Health => run_health(&settings).await,
    }
}
