pub const MAX_PLAYER_NAME_LENGTH: usize = 20;
pub const MAX_ROOM_NAME_LENGTH: usize = 32;

pub fn sanitize_player_name(name: &str, fallback: &str) -> String {
    let cleaned = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return fallback.to_string();
    }
    cleaned.chars().take(MAX_PLAYER_NAME_LENGTH).collect()
}

pub fn sanitize_room_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return "main".to_string();
    }
    trimmed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(MAX_ROOM_NAME_LENGTH)
        .collect::<String>()
        .to_lowercase()
}
