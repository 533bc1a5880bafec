pub mod mailer;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{Config, MAIL_SUBJECT};
use crate::error::Result;
use crate::types::SlotRecord;

pub use mailer::{LogMailer, Mailer, OutboundEmail, SmtpMailer};

/// Formats slot alerts and hands them to a [`Mailer`].
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    from: String,
    to: Vec<String>,
    booking_url: String,
    window_days: u32,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, cfg: &Config) -> Self {
        Self {
            mailer,
            from: cfg.mail.from.clone(),
            to: cfg.mail.to.clone(),
            booking_url: cfg.booking_url(),
            window_days: cfg.window_days,
        }
    }

    pub fn compose(&self, slots: &[SlotRecord]) -> OutboundEmail {
        OutboundEmail {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: MAIL_SUBJECT.to_string(),
            body: render_body(slots, self.window_days, &self.booking_url),
        }
    }

    /// Send one email listing `slots`. Callers only invoke this with a
    /// non-empty list.
    pub async fn notify(&self, slots: &[SlotRecord]) -> Result<()> {
        let email = self.compose(slots);
        self.mailer.send(&email).await?;
        info!(slots = slots.len(), "Notification sent for {} slots", slots.len());
        Ok(())
    }
}

/// One `📅 <date>:` section per date, ascending, each followed by its
/// `- <sport> | Court <court> at <time>` lines in the order given.
pub fn render_slots(slots: &[SlotRecord]) -> String {
    let mut grouped: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for slot in slots {
        grouped
            .entry(slot.date.as_str())
            .or_default()
            .push(format!("- {} | Court {} at {}", slot.sport, slot.court, slot.time));
    }

    let mut text = String::new();
    for (date, lines) in grouped {
        text.push_str(&format!("📅 {date}:\n{}\n\n", lines.join("\n")));
    }
    text
}

pub fn render_body(slots: &[SlotRecord], window_days: u32, booking_url: &str) -> String {
    format!(
        "Here are the new available slots over the next {window_days} days:\n\n{}Book now: {booking_url}",
        render_slots(slots)
    )
}
