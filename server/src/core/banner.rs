//! Startup banner and URL display

use super::config::{AppConfig, is_all_interfaces};
use super::constants::APP_NAME;

/// Label column width
const W: usize = 12;

/// Print the startup banner with URLs and upstream settings
pub fn print_banner(config: &AppConfig) {
    let host = config.server.host.as_str();
    let port = config.server.port;
    let display_host = if is_all_interfaces(host) {
        "localhost"
    } else {
        host
    };

    println!();
    println!(
        "  \x1b[1m\x1b[36m{}\x1b[0m \x1b[90mv{}\x1b[0m",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );
    println!();

    let api_url = format!("http://{}:{}/api/v1", display_host, port);
    println!(
        "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}",
        "API:",
        terminal_link(&api_url)
    );
    let docs_url = format!("http://{}:{}/api/docs", display_host, port);
    println!(
        "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}",
        "Docs:",
        terminal_link(&docs_url)
    );
    println!(
        "  \x1b[33m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}",
        "Upstream:", config.pendo.base_url
    );

    if is_all_interfaces(host)
        && let Ok(interfaces) = local_ip_address::list_afinet_netifas()
    {
        for (_, ip) in interfaces
            .iter()
            .filter(|(_, ip)| ip.is_ipv4() && !ip.is_loopback())
        {
            let network_url = format!("http://{}:{}", ip, port);
            println!(
                "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}",
                "Network:",
                terminal_link(&network_url)
            );
        }
    }

    let cache = if config.cache.enabled {
        format!(
            "on ({} entries, {}s ttl)",
            config.cache.max_entries,
            config.cache.ttl.as_secs()
        )
    } else {
        "off".to_string()
    };
    println!("  \x1b[90m➜  {:<W$} {}\x1b[0m", "Cache:", cache);
    println!(
        "  \x1b[90m➜  {:<W$} {}\x1b[0m",
        "Fallback:",
        if config.fallback.enabled { "on" } else { "off" }
    );
    println!();
}

/// Format a URL as a clickable OSC 8 hyperlink when the terminal supports it
fn terminal_link(url: &str) -> String {
    if supports_hyperlinks::on(supports_hyperlinks::Stream::Stdout) {
        format!("\x1b]8;;{}\x07\x1b[36m{}\x1b[0m\x1b]8;;\x07", url, url)
    } else {
        format!("\x1b[36m{}\x1b[0m", url)
    }
}
