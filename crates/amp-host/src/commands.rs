//! 管理コマンド `/automodpack ...`
//!
//! 権限チェックとメッセージの送信はホスト側で行う。ここでは返信する行を返すだけ。

use tracing::warn;

use crate::service::HostService;

const HOST_USAGE: &str = "/automodpack host start|stop|restart|connections|fingerprint";

/// サブコマンドを実行して返信する行を返す
///
/// # 引数
/// - `args`: `/automodpack` 以降の引数
pub async fn execute(service: &HostService, args: &[&str]) -> Vec<String> {
    let Some(first) = args.first() else {
        return about(service);
    };
    match first.to_ascii_lowercase().as_str() {
        "generate" => generate(service).await,
        "host" => host(service, args.get(1).copied()).await,
        "config" => config(service, args.get(1).copied()),
        _ => vec!["Unknown sub-command. Try /automodpack for usage.".to_string()],
    }
}

fn about(service: &HostService) -> Vec<String> {
    let settings = service.context().settings();
    vec![
        format!("AutoModpack {}", settings.automodpack_version),
        "/automodpack generate".to_string(),
        HOST_USAGE.to_string(),
        "/automodpack config reload".to_string(),
    ]
}

async fn generate(service: &HostService) -> Vec<String> {
    if service.is_generating() {
        return vec!["Modpack generation is already in progress.".to_string()];
    }
    let mut lines = vec!["Regenerating AutoModpack metadata...".to_string()];
    lines.push(match service.regenerate().await {
        Ok(true) => "Modpack metadata regenerated!".to_string(),
        Ok(false) => {
            "Modpack regeneration completed without output. Check your mods folder.".to_string()
        }
        Err(e) => {
            warn!(error = %e, "modpack regeneration failed");
            "Modpack regeneration failed. Check the server logs.".to_string()
        }
    });
    lines
}

async fn host(service: &HostService, action: Option<&str>) -> Vec<String> {
    let Some(action) = action else {
        let state = if service.is_host_running() {
            "running"
        } else {
            "stopped"
        };
        return vec![format!("Modpack hosting is {state}.")];
    };

    match action.to_ascii_lowercase().as_str() {
        "start" => {
            if service.is_host_running() {
                return vec!["Modpack hosting is already running.".to_string()];
            }
            let mut lines = vec!["Starting modpack host...".to_string()];
            lines.push(match service.start_host().await {
                Ok(_) => "Modpack hosting started!".to_string(),
                Err(e) => {
                    warn!(error = %e, "failed to start modpack host");
                    "Failed to start modpack hosting. Check the server logs.".to_string()
                }
            });
            lines
        }
        "stop" => {
            if !service.is_host_running() {
                return vec!["Modpack hosting is not running.".to_string()];
            }
            let mut lines = vec!["Stopping modpack host...".to_string()];
            lines.push(if service.stop_host() {
                "Modpack hosting stopped.".to_string()
            } else {
                "Failed to stop modpack hosting.".to_string()
            });
            lines
        }
        "restart" => {
            let mut lines = vec!["Restarting modpack host...".to_string()];
            lines.push(match service.restart_host().await {
                Ok(()) => "Modpack hosting restarted.".to_string(),
                Err(e) => {
                    warn!(error = %e, "failed to restart modpack host");
                    "Failed to restart modpack hosting. Check the server logs.".to_string()
                }
            });
            lines
        }
        "connections" => connections(service),
        "fingerprint" => match service.certificate_fingerprint() {
            Some(fp) => vec![format!("Certificate fingerprint: {fp}")],
            None => vec![
                "Certificate fingerprint is not available. Start the host first.".to_string(),
            ],
        },
        _ => vec![
            "Unknown host command. Try start, stop, restart, connections, or fingerprint."
                .to_string(),
        ],
    }
}

fn connections(service: &HostService) -> Vec<String> {
    let mut connections: Vec<(String, usize)> = service.connections().into_iter().collect();
    connections.sort();
    let total: usize = connections.iter().map(|(_, n)| n).sum();

    let mut lines = vec![format!(
        "Active connections: {total} Unique connections: {}",
        connections.len()
    )];
    lines.extend(
        connections
            .into_iter()
            .map(|(id, n)| format!("Player {id} is downloading with {n} connection(s).")),
    );
    lines
}

fn config(service: &HostService, action: Option<&str>) -> Vec<String> {
    if !action.is_some_and(|a| a.eq_ignore_ascii_case("reload")) {
        return vec![
            "Unknown config command. Did you mean /automodpack config reload?".to_string(),
        ];
    }
    match service.reload_config() {
        Ok(_) => vec!["AutoModpack config reloaded from disk.".to_string()],
        Err(e) => {
            warn!(error = %e, "failed to reload config.yml");
            vec!["Failed to reload config.yml. Check the server logs.".to_string()]
        }
    }
}
