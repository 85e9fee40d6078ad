use serde_json::{json, Value};

use super::{Notification, NotificationSink, NotifyError};
use crate::blob::DiscordChannel;

const COLOR_NEW: u32 = 0x00ff00;
const COLOR_RETURNING: u32 = 0x3498db;

/// Posts each notification as an embed in a Discord channel.
pub struct DiscordSink {
    channel: DiscordChannel,
}

impl DiscordSink {
    pub fn new(channel: DiscordChannel) -> Self {
        Self { channel }
    }
}

impl NotificationSink for DiscordSink {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.channel.post_json(&embed(notification))?;
        Ok(())
    }
}

fn embed(n: &Notification) -> Value {
    let field = |name: &str, value: String, inline: bool| {
        json!({ "name": name, "value": value, "inline": inline })
    };
    json!({
        "embeds": [{
            "title": n.title(),
            "color": if n.is_new { COLOR_NEW } else { COLOR_RETURNING },
            "fields": [
                field("📄 Page", n.page.clone(), true),
                field("🌍 Location", n.region.clone(), true),
                field("🕐 Timezone", n.timezone.clone(), true),
                field("🖥️ Device", format!("{} / {}", n.device, n.browser), true),
                field("🆔 Visitor ID", n.visitor_id.clone(), true),
                field("👁️ Visitor Views", n.visitor_views.to_string(), true),
                field(
                    "📊 Totals",
                    format!("{} views, {} unique visitors", n.total_views, n.unique_visitors),
                    false,
                ),
            ],
            "timestamp": n.timestamp.to_rfc3339(),
        }]
    })
}
