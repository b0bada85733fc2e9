//! Texts sent to members

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::clock::from_epoch_ms;

const EXPIRY_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute] UTC");

fn format_expiry(expiry_at: i64) -> String {
    from_epoch_ms(expiry_at)
        .ok()
        .and_then(|dt| dt.format(EXPIRY_FORMAT).ok())
        .unwrap_or_else(|| expiry_at.to_string())
}

pub fn purchase_confirmation(expiry_at: i64) -> String {
    format!(
        "Your Prime membership is active until {}. Thank you for your support!",
        format_expiry(expiry_at)
    )
}

pub fn expiry_warning(expiry_at: i64) -> String {
    format!(
        "Heads up: your Prime membership expires on {}. Renew before then to keep your Prime role.",
        format_expiry(expiry_at)
    )
}

pub fn expired_notice() -> String {
    "Your Prime membership has expired and the Prime role has been removed. Renew any time to get it back."
        .to_string()
}
