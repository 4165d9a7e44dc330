/// Recipient and phone format checks for the send endpoint. Formats are
/// channel-specific; none of these talk to a provider.

pub fn is_valid_email(value: &str) -> bool {
    value.contains('@') && !value.starts_with('@')
}

/// `@handle`, or a numeric chat id for recipients who already started
/// the bot.
pub fn is_valid_telegram_recipient(value: &str) -> bool {
    if value.starts_with('@') {
        return value.len() > 1;
    }
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit())
}

/// Strips spaces and dashes, then requires international `+` format.
pub fn normalize_phone(value: &str) -> Option<String> {
    let normalized: String = value
        .chars()
        .filter(|ch| *ch != ' ' && *ch != '-')
        .collect();
    let digits = normalized.strip_prefix('+')?;
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    Some(normalized)
}
