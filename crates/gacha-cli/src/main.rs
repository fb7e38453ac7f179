// ============================================================================
// gacha-admin - Operator CLI for the gacha reward engine
// ============================================================================
// Usage:
//   gacha-admin import-catalog data/catalog.json   Load gifts and cases
//   gacha-admin list-cases                         Show active cases
//   gacha-admin deposit --user U --amount 5        Credit 5 TON
//   gacha-admin open-case --user U --case basic    Open a case
//   gacha-admin upgrade --user U --input star:2 --target ring
//   gacha-admin seed rotate --user U               Reveal the server seed
//   gacha-admin recent-wins --limit 10             Latest wins feed
//   gacha-admin stats                              Show database statistics
//   gacha-admin export --format json               Export full database as JSON
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use gacha_core::fairness::verify_commitment;
use gacha_core::{
    nano_to_ton, replay_case_draw, ton_to_nano, CatalogFile, ContractStatus, GachaConfig,
    GachaDb, GiftQuantity, RewardCatalog, Resolver,
};

/// Gacha engine operator tool
#[derive(Parser)]
#[command(name = "gacha-admin", version, about = "Operate and inspect the gacha reward engine")]
struct Cli {
    /// Path to the database file (default: GACHA_DB_PATH or ~/.gacha/gacha.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and import a JSON catalog of gifts and cases
    ImportCatalog {
        path: PathBuf,

        /// Validate only, do not write
        #[arg(long)]
        check: bool,
    },

    /// List active cases with their reward tables
    ListCases,

    /// Credit a user's balance (amount in TON)
    Deposit {
        #[arg(long)]
        user: String,
        #[arg(long)]
        amount: f64,
    },

    /// Debit a user's balance (amount in TON)
    Withdraw {
        #[arg(long)]
        user: String,
        #[arg(long)]
        amount: f64,
    },

    /// Open a case for a user
    OpenCase {
        #[arg(long)]
        user: String,
        #[arg(long = "case")]
        case_id: String,
        /// Number of consecutive openings
        #[arg(long, default_value = "1")]
        count: u32,
    },

    /// Create an upgrade contract and execute it
    Upgrade {
        #[arg(long)]
        user: String,
        /// Input gift as GIFT or GIFT:QTY, repeatable
        #[arg(long = "input", required = true)]
        inputs: Vec<String>,
        #[arg(long)]
        target: String,
        /// Only create the contract, execute later with `execute`
        #[arg(long)]
        quote_only: bool,
    },

    /// Execute a pending upgrade contract
    Execute {
        #[arg(long)]
        contract: String,
    },

    /// List upgrade targets for an input value (in TON)
    Targets {
        #[arg(long)]
        value: f64,
    },

    /// Sell gifts back at catalog price
    Sell {
        #[arg(long)]
        user: String,
        #[arg(long)]
        gift: String,
        #[arg(long, default_value = "1")]
        quantity: u64,
    },

    /// Show a user's balance and inventory
    Inventory {
        #[arg(long)]
        user: String,
    },

    /// Show a user's recent transactions
    History {
        #[arg(long)]
        user: String,
    },

    /// List upgrade contracts
    Contracts {
        #[arg(long)]
        user: Option<String>,
        /// Filter by status: pending, success, failed
        #[arg(long)]
        status: Option<String>,
    },

    /// Seed chain management
    Seed {
        #[command(subcommand)]
        action: SeedAction,
    },

    /// Show the latest case and upgrade wins across all users
    RecentWins {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show database statistics
    Stats,

    /// Export full database contents as JSON
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },
}

#[derive(Subcommand)]
enum SeedAction {
    /// Show the commitment for the user's next draw
    Show {
        #[arg(long)]
        user: String,
    },

    /// Reveal the current server seed and start a new chain
    Rotate {
        #[arg(long)]
        user: String,
        #[arg(long)]
        client_seed: Option<String>,
    },

    /// Replay a case draw from revealed seeds
    Verify {
        #[arg(long = "case")]
        case_id: String,
        #[arg(long)]
        server_seed: String,
        #[arg(long)]
        server_seed_hash: Option<String>,
        #[arg(long)]
        client_seed: String,
        #[arg(long)]
        nonce: u64,
    },

    /// Replay a resolved upgrade contract from the revealed server seed
    VerifyContract {
        #[arg(long)]
        contract: String,
        #[arg(long)]
        server_seed: String,
    },
}

type Engine = Resolver<GachaDb, GachaDb>;

fn parse_status(s: &str) -> Result<ContractStatus> {
    match s.to_lowercase().as_str() {
        "pending" => Ok(ContractStatus::Pending),
        "success" => Ok(ContractStatus::Success),
        "failed" => Ok(ContractStatus::Failed),
        _ => anyhow::bail!("Unknown status '{}'. Valid values: pending, success, failed", s),
    }
}

fn parse_input(s: &str) -> Result<GiftQuantity> {
    match s.split_once(':') {
        Some((gift_id, qty)) => {
            let quantity = qty
                .parse::<u64>()
                .with_context(|| format!("Invalid quantity in '{}'", s))?;
            Ok(GiftQuantity::new(gift_id, quantity))
        }
        None => Ok(GiftQuantity::new(s, 1)),
    }
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

fn ton(nano: u64) -> String {
    format!("{:.4} TON", nano_to_ton(nano))
}

fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Could not load .env file: {}", e);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gacha_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GachaConfig::from_env();
    let db_path = cli.db_path.clone().or_else(|| config.db_path.clone());
    let db = Arc::new(GachaDb::open(db_path.as_deref())?);
    let engine = Resolver::new(db.clone(), db.clone(), config);

    match cli.command {
        Commands::ImportCatalog { path, check } => cmd_import_catalog(&db, &path, check),
        Commands::ListCases => cmd_list_cases(&engine),
        Commands::Deposit { user, amount } => {
            let balance = engine.deposit(&user, ton_to_nano(amount))?;
            println!("Balance of {}: {}", user, ton(balance.amount));
            Ok(())
        }
        Commands::Withdraw { user, amount } => {
            let balance = engine.withdraw(&user, ton_to_nano(amount))?;
            println!("Balance of {}: {}", user, ton(balance.amount));
            Ok(())
        }
        Commands::OpenCase {
            user,
            case_id,
            count,
        } => cmd_open_case(&engine, &user, &case_id, count),
        Commands::Upgrade {
            user,
            inputs,
            target,
            quote_only,
        } => cmd_upgrade(&engine, &user, &inputs, &target, quote_only),
        Commands::Execute { contract } => cmd_execute(&engine, &contract),
        Commands::Targets { value } => cmd_targets(&engine, value),
        Commands::Sell {
            user,
            gift,
            quantity,
        } => {
            let balance = engine.sell_gift(&user, &gift, quantity)?;
            println!("Sold {}x {}. Balance of {}: {}", quantity, gift, user, ton(balance.amount));
            Ok(())
        }
        Commands::Inventory { user } => cmd_inventory(&engine, &user),
        Commands::History { user } => cmd_history(&engine, &user),
        Commands::Contracts { user, status } => cmd_contracts(&db, user, status),
        Commands::Seed { action } => cmd_seed(&engine, action),
        Commands::RecentWins { limit } => cmd_recent_wins(&engine, limit),
        Commands::Stats => cmd_stats(&db),
        Commands::Export { format } => cmd_export(&db, &format),
    }
}

fn cmd_import_catalog(db: &GachaDb, path: &Path, check: bool) -> Result<()> {
    let catalog = CatalogFile::load(path)?;
    if check {
        let problems = gacha_core::validate_catalog(&catalog.gifts, &catalog.cases);
        if problems.is_empty() {
            println!(
                "Catalog OK: {} gifts, {} cases",
                catalog.gifts.len(),
                catalog.cases.len()
            );
            return Ok(());
        }
        for problem in &problems {
            println!("  - {}", problem);
        }
        anyhow::bail!("{} catalog problems found", problems.len());
    }

    let (gifts, cases) = db.import_catalog(&catalog)?;
    println!("Imported {} gifts and {} cases", gifts, cases);
    Ok(())
}

fn cmd_list_cases(engine: &Engine) -> Result<()> {
    let cases = engine.list_cases()?;
    if cases.is_empty() {
        println!("No active cases. Import a catalog first.");
        return Ok(());
    }

    for case in &cases {
        let total: f64 = case.rewards.iter().map(|r| r.weight).sum();
        println!("{} ({}) - {}", case.id, case.name, ton(case.price));
        for reward in &case.rewards {
            let value = engine
                .catalog()
                .get_gift(&reward.gift_id)?
                .map_or_else(|| "?".to_string(), |g| ton(g.price));
            println!(
                "  {:<20} {:>14}  {:>6.2}%",
                reward.gift_id,
                value,
                reward.weight / total * 100.0
            );
        }
    }
    Ok(())
}

fn cmd_open_case(engine: &Engine, user: &str, case_id: &str, count: u32) -> Result<()> {
    for _ in 0..count {
        let opening = engine.open_case(user, case_id)?;
        println!(
            "{} won {} ({}, {}) | balance {} | nonce {}",
            user,
            opening.gift.name,
            opening.gift.rarity.as_str(),
            ton(opening.gift.price),
            ton(opening.new_balance),
            opening.proof.nonce
        );
    }
    Ok(())
}

fn cmd_upgrade(
    engine: &Engine,
    user: &str,
    inputs: &[String],
    target: &str,
    quote_only: bool,
) -> Result<()> {
    let inputs = inputs
        .iter()
        .map(|s| parse_input(s))
        .collect::<Result<Vec<_>>>()?;

    let quote = engine.create_upgrade_contract(user, &inputs, target)?;
    println!("Contract:  {}", quote.contract_id);
    println!("Input:     {}", ton(quote.input_value));
    println!("Chance:    {:.0}%", quote.success_chance * 100.0);

    if quote_only {
        return Ok(());
    }
    cmd_execute(engine, &quote.contract_id)
}

fn cmd_execute(engine: &Engine, contract_id: &str) -> Result<()> {
    let outcome = engine.execute_upgrade_contract(contract_id)?;
    match (&outcome.result_gift, outcome.success) {
        (Some(gift), true) => println!("Upgrade succeeded: {} ({})", gift.name, ton(gift.price)),
        (Some(gift), false) => println!(
            "Upgrade failed, consolation: {} ({})",
            gift.name,
            ton(gift.price)
        ),
        (None, _) => println!("Upgrade failed, no consolation"),
    }
    println!("Nonce:     {}", outcome.proof.nonce);
    Ok(())
}

fn cmd_targets(engine: &Engine, value: f64) -> Result<()> {
    let targets = engine.upgrade_targets(ton_to_nano(value))?;
    if targets.is_empty() {
        println!("No upgrade targets for {}", ton(ton_to_nano(value)));
        return Ok(());
    }
    for gift in &targets {
        println!("{:<20} {:>14}  {}", gift.id, ton(gift.price), gift.rarity.as_str());
    }
    Ok(())
}

fn cmd_inventory(engine: &Engine, user: &str) -> Result<()> {
    let balance = engine.balance(user)?;
    println!("Balance: {} (v{})", ton(balance.amount), balance.version);

    let items = engine.inventory(user)?;
    if items.is_empty() {
        println!("No gifts.");
        return Ok(());
    }

    println!("{:<20}  {:<10}  {:>14}  {}", "GIFT", "RARITY", "VALUE", "QTY");
    println!("{}", "-".repeat(56));
    for item in &items {
        println!(
            "{:<20}  {:<10}  {:>14}  {}",
            item.gift.id,
            item.gift.rarity.as_str(),
            ton(item.gift.price),
            item.quantity
        );
    }
    Ok(())
}

fn cmd_history(engine: &Engine, user: &str) -> Result<()> {
    let records = engine.history(user)?;
    if records.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!(
        "{:<22}  {:<20}  {:>16}  {:<16}  {}",
        "TIME", "KIND", "BALANCE", "GIFT", "REFERENCE"
    );
    println!("{}", "-".repeat(100));
    for record in &records {
        let gift = record
            .gift_id
            .as_deref()
            .map(|g| format!("{} {:+}", g, record.quantity_delta))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<22}  {:<20}  {:>16}  {:<16}  {}",
            format_timestamp(record.created_at),
            format!("{:?}", record.kind),
            record.balance_delta,
            gift,
            record.reference.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn cmd_contracts(db: &GachaDb, user: Option<String>, status: Option<String>) -> Result<()> {
    let filter = status.as_deref().map(parse_status).transpose()?;
    let contracts = db.list_contracts(user.as_deref(), filter)?;

    if contracts.is_empty() {
        println!("No contracts found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<12}  {:<8}  {:>6}  {:<16}  {}",
        "CONTRACT ID", "USER", "STATUS", "CHANCE", "TARGET", "CREATED AT"
    );
    println!("{}", "-".repeat(110));
    for contract in &contracts {
        println!(
            "{:<36}  {:<12}  {:<8}  {:>5.0}%  {:<16}  {}",
            contract.id,
            contract.user_id,
            format!("{:?}", contract.status),
            contract.success_chance * 100.0,
            contract.target_gift_id,
            format_timestamp(contract.created_at)
        );
    }

    println!("\nTotal: {} contracts", contracts.len());
    Ok(())
}

fn cmd_seed(engine: &Engine, action: SeedAction) -> Result<()> {
    match action {
        SeedAction::Show { user } => {
            let next = engine.seed_commitment(&user)?;
            println!("Server seed hash: {}", next.server_seed_hash);
            println!("Client seed:      {}", next.client_seed);
            println!("Next nonce:       {}", next.nonce);
        }
        SeedAction::Rotate { user, client_seed } => {
            let reveal = engine.rotate_seed(&user, client_seed.as_deref())?;
            println!("Revealed server seed: {}", reveal.revealed_server_seed);
            println!("Its hash:             {}", reveal.revealed_server_seed_hash);
            println!("Client seed:          {}", reveal.client_seed);
            println!("Draws made:           {}", reveal.final_nonce);
            println!("Next commitment:      {}", reveal.next_server_seed_hash);
        }
        SeedAction::Verify {
            case_id,
            server_seed,
            server_seed_hash,
            client_seed,
            nonce,
        } => {
            if let Some(hash) = server_seed_hash {
                if !verify_commitment(&hash, &server_seed) {
                    anyhow::bail!("Server seed does not match commitment {}", hash);
                }
                println!("Commitment verified");
            }
            let case = engine
                .catalog()
                .get_case(&case_id)?
                .with_context(|| format!("Case not found: {}", case_id))?;
            let gift_id = replay_case_draw(&case, &server_seed, &client_seed, nonce)?;
            println!("Draw {} of {} resolves to {}", nonce, case_id, gift_id);
        }
        SeedAction::VerifyContract {
            contract,
            server_seed,
        } => {
            let check = engine.verify_upgrade(&contract, &server_seed)?;
            if !check.commitment_valid {
                anyhow::bail!("Server seed does not match the commitment of {}", contract);
            }
            println!("Commitment verified");
            println!(
                "Replayed: {} -> {}",
                if check.replay.success { "success" } else { "failed" },
                check.replay.result_gift_id.as_deref().unwrap_or("nothing")
            );
            if !check.outcome_matches {
                anyhow::bail!("Replayed outcome differs from the recorded one");
            }
            println!("Recorded outcome matches");
        }
    }
    Ok(())
}

fn cmd_recent_wins(engine: &Engine, limit: usize) -> Result<()> {
    let wins = engine.recent_wins(limit)?;
    if wins.is_empty() {
        println!("No wins yet.");
        return Ok(());
    }

    println!("{:<22} {:<20} {:<20} {:>14}", "TIME", "USER", "GIFT", "VALUE");
    for win in &wins {
        println!(
            "{:<22} {:<20} {:<20} {:>14}",
            format_timestamp(win.created_at),
            win.user_id,
            win.gift.id,
            ton(win.gift.price)
        );
    }
    Ok(())
}

fn cmd_stats(db: &GachaDb) -> Result<()> {
    let stats = db.stats()?;

    println!("=== Gacha Database Stats ===");
    match db.path() {
        Some(path) => println!("Database: {}", path.display()),
        None => println!("Database: (in memory)"),
    }
    println!();
    println!("Catalog:      {} gifts, {} cases", stats.total_gifts, stats.total_cases);
    println!("Users:        {} ({} active in 24h)", stats.total_users, stats.active_users);
    println!("Deposits:     {}", ton(stats.total_deposits));
    println!("Balances:     {}", ton(stats.total_balance));
    println!("Transactions: {}", stats.total_transactions);
    println!("Cases opened: {}", stats.cases_opened);
    println!("Contracts:");
    for (status, count) in &stats.contract_counts {
        println!("  {:12} {}", status, count);
    }

    Ok(())
}

fn cmd_export(db: &GachaDb, format: &str) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }

    let stats = db.stats()?;
    let gifts = db.list_gifts()?;
    let cases = db.list_all_cases()?;
    let balances = db.list_balances()?;
    let contracts = db.list_contracts(None, None)?;

    let users: Vec<_> = balances
        .iter()
        .map(|(user_id, balance)| -> Result<serde_json::Value> {
            Ok(serde_json::json!({
                "user_id": user_id,
                "balance": balance,
                "inventory": db.list_inventory(user_id)?,
            }))
        })
        .collect::<Result<_>>()?;

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "stats": stats,
        "gifts": gifts,
        "cases": cases,
        "users": users,
        "contracts": contracts,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}
