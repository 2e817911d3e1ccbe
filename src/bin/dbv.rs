//! CLI tool to inspect and apply versioning scripts.
//!
//! Usage:
//!   cargo run --bin dbv -- status
//!   cargo run --bin dbv -- scripts
//!   cargo run --bin dbv -- pending
//!   cargo run --bin dbv -- exec --file <resource-name>
//!   cargo run --bin dbv -- logs --limit 20

use std::env;

use dbversioning_lib::config::Config;
use dbversioning_lib::db::DbPool;
use dbversioning_lib::error::AppResult;
use dbversioning_lib::models::OperationResult;
use dbversioning_lib::services::VersioningService;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let command = &args[1];
    if matches!(command.as_str(), "help" | "--help" | "-h") {
        print_usage();
        return;
    }

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match DbPool::new(&config).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error connecting to database: {}", e);
            std::process::exit(1);
        }
    };

    let service = match VersioningService::from_config(&pool, &config, "dbv") {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error initializing versioning engine: {}", e);
            std::process::exit(1);
        }
    };

    match service.controller().setup_versioning_tables().await {
        Ok(true) => {}
        Ok(false) => eprintln!("Database {} does not exist.", config.database.name),
        Err(e) => {
            eprintln!("Error creating versioning tables: {}", e);
            std::process::exit(1);
        }
    }

    match command.as_str() {
        "status" | "st" => show_status(&service).await,
        "scripts" | "ls" => list_scripts(&service).await,
        "schema" => report(service.execute_schema_updates().await),
        "data" => report(service.execute_data_scripts().await),
        "integrity" => report(service.execute_integrity_scripts().await),
        "pending" => report(service.execute_all_pending_scripts().await),
        "exec" => {
            let file = parse_arg(&args, &["--file", "-f"]).unwrap_or_else(|| {
                eprintln!("Error: --file is required");
                std::process::exit(1);
            });
            execute_script(&service, &file).await;
        }
        "logs" => {
            let limit = match parse_arg(&args, &["--limit", "-n"]) {
                Some(raw) => raw.parse().unwrap_or_else(|_| {
                    eprintln!("Error: --limit must be a number");
                    std::process::exit(1);
                }),
                None => 20,
            };
            show_logs(&service, limit).await;
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn parse_arg(args: &[String], flags: &[&str]) -> Option<String> {
    let mut i = 2;
    while i < args.len() {
        if flags.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn report(result: AppResult<OperationResult>) {
    match result {
        Ok(r) if r.success => println!("{}", r.info),
        Ok(r) => {
            eprintln!("{}", r.info);
            if let Some(detail) = r.detailed_info {
                eprintln!("{}", detail);
            }
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn show_status(service: &VersioningService) {
    let result = match service.check_versioning_status().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error loading status: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", result.info);
    let Some(status) = result.data else {
        return;
    };

    let pending: Vec<_> = status
        .scripts
        .iter()
        .filter(|s| s.execution_required)
        .collect();
    if !pending.is_empty() {
        println!();
        println!("Pending scripts:");
        for script in pending {
            println!("  {:>5} {:<10} {}", script.id, script.kind, script.file_name);
        }
    }

    if !status.scripts_logs.is_empty() {
        println!();
        println!("Rejected scripts:");
        for log in &status.scripts_logs {
            println!("  {}: {}", log.script.file_name, log.message);
        }
    }
}

async fn list_scripts(service: &VersioningService) {
    let scripts = match service.scripts().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error listing scripts: {}", e);
            std::process::exit(1);
        }
    };

    if scripts.is_empty() {
        println!("No scripts found.");
        return;
    }

    println!();
    println!(
        "{:<6} {:<10} {:<8} {:<20} {}",
        "ID", "KIND", "STATUS", "APPLIED", "NAME"
    );
    println!("{}", "-".repeat(80));

    for script in scripts {
        let status = if script.execution_required {
            "pending"
        } else {
            "ok"
        };
        let applied = script
            .impacted_date
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<6} {:<10} {:<8} {:<20} {}",
            script.id, script.kind, status, applied, script.name
        );
    }
    println!();
}

async fn execute_script(service: &VersioningService, file: &str) {
    match service.execute_script(file).await {
        Ok(r) if r.success => {
            println!("{}", r.info);
            for line in r.data.unwrap_or_default() {
                println!("  {}", line);
            }
        }
        Ok(r) => {
            eprintln!("{}", r.info);
            if let Some(detail) = r.detailed_info {
                eprintln!("{}", detail);
            }
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn show_logs(service: &VersioningService, limit: i64) {
    let entries = match service.audit_log(limit).await {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error reading audit log: {}", e);
            std::process::exit(1);
        }
    };

    if entries.is_empty() {
        println!("No log entries found.");
        return;
    }

    for entry in entries {
        let related = entry
            .related_script_id
            .map(|id| format!(" [script {}]", id))
            .unwrap_or_default();
        println!(
            "{} {:<7} {}{}",
            entry.date.format("%Y-%m-%d %H:%M:%S"),
            format!("{:?}", entry.severity),
            entry.message,
            related
        );
    }
}

fn print_usage() {
    println!(
        r#"
Database Versioning CLI

USAGE:
    dbv <COMMAND> [OPTIONS]

COMMANDS:
    status, st              Load the versioning status of the target database
    scripts, ls             List cataloged scripts in execution order
    schema                  Execute pending Schema scripts
    data                    Execute pending Data scripts
    integrity               Run every Integrity script
    pending                 Execute pending Schema and Data scripts by id
    exec --file <NAME>      Execute one script by resource name
    logs [--limit <N>]      Show the latest audit log entries (default 20)
    help                    Show this help message

ENVIRONMENT:
    RUST_ENV                development or production
    DATABASE_URL            Versioning connection URL
    DBV_DATABASE_NAME       Target database name
    DBV_SCRIPTS_DIR         Directory holding the script resources

EXAMPLES:
    dbv status
    dbv exec --file App.Resources.DB.0042.Orders.Schema.AddIndex.sql
    dbv logs --limit 50
"#
    );
}
