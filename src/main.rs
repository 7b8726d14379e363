//! Vigil - quest verification engine
//!
//! Keeps watch over a Solana wallet ledger so daily quests verify
//! themselves.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil::{
    aggregate::today_utc,
    config::{parse_wallet_list, Args, Command, QuestCommand},
    engine::VerifyEngine,
    ledger::{LedgerApi, LedgerClient},
    quest::{Quest, TokenSelector, VerificationKind},
    registry::ProtocolRegistry,
    scheduler,
    store::Store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("vigil={},info", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    match args.command.clone() {
        Command::Run => {
            print_banner(&args);
            let engine = build_engine(&args)?;
            scheduler::run_verify_loop(engine, args.check_interval_secs).await;
            Ok(())
        }

        Command::Check { quest_id } => {
            let engine = build_engine(&args)?;
            let quest = load_quest(&engine, &quest_id)?;
            let report = engine.check_today(&quest).await?;

            if report.verified {
                println!("Quest '{}' verified for {} (UTC)", quest.title, report.date);
                if let Some(wallet) = &report.wallet {
                    println!("  wallet:    {wallet}");
                }
                if let Some(signature) = &report.evidence_signature {
                    println!("  evidence:  {signature}");
                }
                if report.total_sol > 0.0 {
                    println!("  SOL:       {:.4}", report.total_sol);
                }
                if report.total_usdc > 0.0 {
                    println!("  USDC:      {:.2}", report.total_usdc);
                }
                if !report.newly_recorded {
                    println!("  (already recorded)");
                }
            } else {
                println!(
                    "Quest '{}' not yet satisfied for {} (UTC); checked {} transaction(s)",
                    quest.title, report.date, report.signatures_checked
                );
            }
            Ok(())
        }

        Command::Backfill { quest_id } => {
            let engine = build_engine(&args)?;
            let quest = load_quest(&engine, &quest_id)?;
            let report = engine.backfill(&quest).await?;

            println!(
                "Backfill for '{}' over wallet {}: {} day(s) satisfied, {} new, {} already recorded",
                quest.title,
                report.wallet,
                report.days_found.len(),
                report.inserted,
                report.already_recorded
            );
            for date in &report.days_found {
                println!("  {date}");
            }
            Ok(())
        }

        Command::Balance { wallet } => {
            let client = LedgerClient::new(args.ledger_config());
            let sol = client.get_balance(&wallet).await?;
            let usdc = client.usdc_balance(&wallet).await?;
            println!("{wallet}");
            println!("  SOL:  {sol:.4}");
            println!("  USDC: {usdc:.2}");
            Ok(())
        }

        Command::Quest(cmd) => {
            let store = Arc::new(Store::open(&args.db_path)?);
            run_quest_command(&store, cmd)
        }
    }
}

fn print_banner(args: &Args) {
    info!("======================================");
    info!("  Vigil - Quest Verification Engine");
    info!("======================================");
    info!("RPC endpoint: {}", args.rpc_url);
    info!("Database: {:?}", args.db_path);
    info!("Sweep interval: {}s", args.check_interval_secs);
    info!("Signature page: {}", args.signature_limit);
    info!("Fetch concurrency: {}", args.fetch_concurrency);
    info!("======================================");
}

fn build_engine(args: &Args) -> anyhow::Result<Arc<VerifyEngine<LedgerClient>>> {
    let store = Arc::new(Store::open(&args.db_path)?);
    let ledger = LedgerClient::new(args.ledger_config());

    Ok(Arc::new(VerifyEngine::new(
        ledger,
        ProtocolRegistry::builtin(),
        store,
        args.engine_config(),
    )))
}

fn load_quest(engine: &VerifyEngine<LedgerClient>, quest_id: &str) -> anyhow::Result<Quest> {
    engine
        .store()
        .get_quest(quest_id)?
        .ok_or_else(|| anyhow::anyhow!("quest not found: {quest_id}"))
}

fn run_quest_command(store: &Arc<Store>, cmd: QuestCommand) -> anyhow::Result<()> {
    match cmd {
        QuestCommand::Add {
            owner,
            title,
            kind,
            wallets,
            source_wallet,
            token,
            min_amount,
            protocol,
        } => {
            let kind = VerificationKind::parse(&kind)
                .ok_or_else(|| anyhow::anyhow!("unknown verification kind: {kind}"))?;
            let token = TokenSelector::parse(&token)
                .ok_or_else(|| anyhow::anyhow!("unknown token selector: {token}"))?;

            let mut quest = Quest::new(&owner, &title, kind);
            quest.wallets = parse_wallet_list(&wallets);
            quest.source_wallet = source_wallet;
            quest.token = token;
            quest.min_amount = min_amount;
            quest.protocol = protocol;

            store.insert_quest(&quest)?;
            println!("Created quest {}", quest.id);
            Ok(())
        }

        QuestCommand::List => {
            let today = today_utc();
            let quests = store.list_quests()?;

            if quests.is_empty() {
                println!("No quests.");
                return Ok(());
            }

            for quest in quests {
                let completions = store.list_completions(&quest.id)?;
                let streak = store.current_streak(&quest.id, today)?;
                let last = completions
                    .first()
                    .map(|c| c.completed_date.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  [{}] '{}' owner={} completions={} streak={} last={}",
                    quest.id,
                    quest.kind.as_str(),
                    quest.title,
                    quest.owner,
                    completions.len(),
                    streak,
                    last
                );
            }
            Ok(())
        }

        QuestCommand::Remove { quest_id } => {
            if store.delete_quest(&quest_id)? {
                println!("Deleted quest {quest_id} and its completions");
            } else {
                println!("No such quest: {quest_id}");
            }
            Ok(())
        }
    }
}
