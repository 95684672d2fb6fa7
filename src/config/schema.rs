//! Configuration schema validation and helpers

use std::time::Duration;

/// Parse a duration string like "30m", "1h", "2h30m"
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let mut total_seconds: u64 = 0;
    let mut current_num = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            current_num.push(c);
        } else {
            let num: u64 = current_num
                .parse()
                .map_err(|_| format!("Invalid number in duration: {}", s))?;
            current_num.clear();

            total_seconds += match c {
                's' => num,
                'm' => num * 60,
                'h' => num * 3600,
                'd' => num * 86400,
                _ => return Err(format!("Unknown duration unit: {}", c)),
            };
        }
    }

    if total_seconds == 0 {
        return Err(format!("Invalid duration: {}", s));
    }

    Ok(Duration::from_secs(total_seconds))
}
