//! Startup banner: version, config source, and which optional surfaces
//! are active, printed before the TUI takes over the screen (or in
//! headless mode).

use crate::config::Config;

const VERSION: &str = env!("CARGO_PKG_VERSION");

mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
}

struct ModuleStatus {
    name: &'static str,
    enabled: bool,
    description: &'static str,
}

/// Prints the startup banner and module status before the TUI or HTTP
/// server takes over.
pub fn print_startup(config: &Config, web_enabled: bool) {
    use colors::*;

    println!();
    println!("  {BOLD}{CYAN}deck{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}Analytics and replay engine for agent coding sessions{RESET}");
    println!();

    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("  {DIM}Config:{RESET} {GREEN}OK{RESET} {}", path.display());
        } else {
            println!("  {DIM}Config:{RESET} {DIM}(using defaults){RESET}");
        }
    }
    println!("  {DIM}Store:{RESET}  {}", config.db_path.display());
    println!();

    for module in module_status(config, web_enabled) {
        print_module_status(&module);
    }
    println!();

    if web_enabled {
        println!("  {BOLD}HTTP API{RESET} listening on {}", config.bind_addr);
    }
    println!();
}

fn module_status(config: &Config, web_enabled: bool) -> Vec<ModuleStatus> {
    vec![
        ModuleStatus {
            name: "store",
            enabled: true,
            description: "Node store",
        },
        ModuleStatus {
            name: "query",
            enabled: true,
            description: "Session analytics",
        },
        ModuleStatus {
            name: "insights",
            enabled: config.insights.enabled,
            description: "Facet extraction",
        },
        ModuleStatus {
            name: "http",
            enabled: web_enabled,
            description: "HTTP API server",
        },
    ]
}

fn print_module_status(module: &ModuleStatus) {
    use colors::*;
    let (icon, style) = if module.enabled {
        ("OK", "")
    } else {
        ("--", DIM)
    };
    println!(
        "    {icon} {style}{:<10}{RESET} {DIM}{}{RESET}",
        module.name, module.description
    );
}

/// Mirrors `print_startup` into the tracing log stream, so the TUI's log
/// panel shows the same boot sequence a headless run prints to stdout.
pub fn log_startup(config: &Config, web_enabled: bool) {
    tracing::info!("deck v{VERSION} starting");
    for module in module_status(config, web_enabled) {
        tracing::info!(
            "  {} {} - {}",
            if module.enabled { "OK" } else { "--" },
            module.name,
            module.description
        );
    }
    if web_enabled {
        tracing::info!("HTTP API listening on {}", config.bind_addr);
    }
    tracing::info!("ready");
}
