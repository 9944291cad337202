//! Side effects of a tick: webhooks, shell hooks and metric points.
//!
//! Everything here runs on [`super::BackgroundTasks`]; failures are logged
//! and never reach the tick loop.

use super::{Classification, Monitor};

use reqwest::header::CONTENT_TYPE;
use std::fmt;
use tokio::process::Command;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookType {
    OnSuccess,
    OnFailure,
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookType::OnSuccess => write!(f, "on_success"),
            HookType::OnFailure => write!(f, "on_failure"),
        }
    }
}

impl Monitor {
    /// POST the rendered webhook for `classification`, if one is configured.
    pub(super) fn trigger_webhook(&self, classification: Classification) {
        let target = match classification {
            Classification::Major => &self.config.webhook.on_critical,
            Classification::Partial => &self.config.webhook.on_partial,
            Classification::Normal => return,
        };
        if !target.is_configured() {
            return;
        }

        let body = target.investigating.render_message(&self.template_data());
        let request = self
            .ctx
            .http
            .post(&target.url)
            .header(CONTENT_TYPE, target.content_type.clone())
            .body(body);
        let url = target.url.clone();

        self.ctx.background.spawn(
            "webhook",
            async move {
                match request.send().await {
                    Ok(resp) if resp.status().is_success() => {
                        tracing::info!("Webhook {} answered {}", url, resp.status())
                    }
                    Ok(resp) => tracing::warn!("Webhook {} answered {}", url, resp.status()),
                    Err(e) => tracing::error!("Webhook {} failed: {}", url, e),
                }
            }
            .in_current_span(),
        );
    }

    /// Run the configured shell hook with
    /// `name component_id target hook_type data` as arguments.
    pub(super) fn trigger_shellhook(&self, hook: HookType, data: String) {
        let path = match hook {
            HookType::OnSuccess => &self.config.shellhook.on_success,
            HookType::OnFailure => &self.config.shellhook.on_failure,
        };
        if path.is_empty() {
            return;
        }

        let mut command = Command::new(path);
        command.args([
            self.config.name.clone(),
            self.config.component_id.to_string(),
            self.config.target.clone(),
            hook.to_string(),
            data,
        ]);
        let path = path.clone();

        self.ctx.background.spawn(
            "shellhook",
            async move {
                match command.output().await {
                    Ok(out) => {
                        let stdout = String::from_utf8_lossy(&out.stdout);
                        let stderr = String::from_utf8_lossy(&out.stderr);
                        if out.status.success() {
                            tracing::info!("Shellhook {} ({}): {}", path, hook, stdout.trim());
                        } else {
                            tracing::warn!(
                                "Shellhook {} ({}) exited with {}: {}{}",
                                path,
                                hook,
                                out.status,
                                stdout.trim(),
                                stderr.trim()
                            );
                        }
                    }
                    Err(e) => tracing::error!("Unable to run shellhook {}: {}", path, e),
                }
            }
            .in_current_span(),
        );
    }

    /// Send `value` to every metric in `ids`.
    pub(super) fn send_metrics(&self, what: &'static str, ids: Vec<u64>, value: i64) {
        if ids.is_empty() {
            return;
        }

        let api = self.ctx.api.clone();
        self.ctx.background.spawn(
            what,
            async move {
                for id in ids {
                    if let Err(e) = api.send_metric_point(id, value).await {
                        tracing::warn!("Could not log {} data point to metric {}: {}", what, id, e);
                    }
                }
            }
            .in_current_span(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cachet::fake::FakeApi;
    use crate::monitor::tests::{context, mock_config};
    use crate::monitor::ThresholdConfig;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn monitor(api: &Arc<FakeApi>) -> Monitor {
        let config = mock_config(vec![false], 1, ThresholdConfig::default());
        Monitor::new(config, context(api.clone(), false)).unwrap()
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_hook_type_literals() {
        assert_eq!(HookType::OnSuccess.to_string(), "on_success");
        assert_eq!(HookType::OnFailure.to_string(), "on_failure");
    }

    #[tokio::test]
    async fn test_metrics_go_to_every_id() {
        let api = Arc::new(FakeApi::new(7));
        let m = monitor(&api);

        m.send_metrics("availability", vec![1, 2], 1);
        m.send_metrics("availability", vec![], 1);
        settle().await;

        assert_eq!(api.metrics(), vec![(1, 1), (2, 1)]);
    }

    #[tokio::test]
    async fn test_webhook_posts_rendered_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut received = String::new();
            while !received.contains("api is down") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                .await
                .unwrap();
            received
        });

        let api = Arc::new(FakeApi::new(7));
        let mut m = monitor(&api);
        m.config.webhook.on_critical.url = format!("http://{}/hook", addr);
        m.config.webhook.on_critical.content_type = "application/json".to_string();
        m.config.webhook.on_critical.investigating.message = "{{ .Monitor.Name }} is down".to_string();

        m.trigger_webhook(Classification::Partial);
        m.trigger_webhook(Classification::Major);

        let received = server.await.unwrap();
        assert!(received.starts_with("POST /hook"));
        assert!(received.to_lowercase().contains("content-type: application/json"));
        assert!(received.ends_with("api is down"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shellhook_receives_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("args");
        let script = dir.path().join("hook.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$@\" > {}\n", out.display()),
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let api = Arc::new(FakeApi::new(7));
        let mut m = monitor(&api);
        m.config.shellhook.on_failure = script.to_string_lossy().into_owned();
        m.config.target = "https://example.com".to_string();

        m.trigger_shellhook(HookType::OnFailure, "timeout".to_string());

        for _ in 0..200 {
            if let Ok(args) = std::fs::read_to_string(&out) {
                if args.ends_with('\n') {
                    assert_eq!(args.trim(), "api 7 https://example.com on_failure timeout");
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("shellhook did not run");
    }
}
