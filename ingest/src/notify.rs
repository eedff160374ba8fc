//! Outbound webhook notification: a rendered clan battle posts an embed
//! with the match-detail link.

use crate::records::MatchRecord;
use anyhow::Result;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::warn;
use wows_replay_parser::types::WinLoss;

pub struct Notifier {
    client: Client,
    webhook_url: String,
    public_base_url: String,
}

impl Notifier {
    pub fn new(webhook_url: String, public_base_url: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Notifier {
            client,
            webhook_url,
            public_base_url,
        })
    }

    /// Fire-and-forget: a webhook outage never blocks the render worker.
    pub fn spawn_match_ready(self: std::sync::Arc<Self>, record: MatchRecord) {
        tokio::spawn(async move {
            if let Err(err) = self.send_match_ready(&record).await {
                warn!(arena = %record.arena_unique_id, error = %err, "webhook notification failed");
            }
        });
    }

    pub async fn send_match_ready(&self, record: &MatchRecord) -> Result<()> {
        let detail_url = format!(
            "{}/match/{}",
            self.public_base_url.trim_end_matches('/'),
            record.arena_unique_id
        );

        let (result_line, color) = match record.win_loss {
            WinLoss::Win => ("Victory", 0x00_FF_00),
            WinLoss::Loss => ("Defeat", 0xFF_00_00),
            WinLoss::Draw => ("Draw", 0x80_80_80),
            WinLoss::Unknown => ("Result unknown", 0x80_80_80),
        };

        let versus = if record.enemy_main_clan_tag.is_empty() {
            "mixed opposition".to_string()
        } else {
            format!("vs [{}]", record.enemy_main_clan_tag)
        };

        let payload = json!({
            "embeds": [{
                "title": format!("{} {}", result_line, versus),
                "description": format!(
                    "{} on {}",
                    record.date_time,
                    if record.map_display_name.is_empty() { &record.map_id } else { &record.map_display_name },
                ),
                "url": detail_url,
                "color": color,
            }]
        });

        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
