//! # Formatting
//!
//! Human-readable rendering of sizes, durations, rates and aspect ratios for
//! the front end.

const SIZE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

const COMMON_RATIOS: [(f64, &str); 10] = [
    (16.0 / 9.0, "16:9"),
    (4.0 / 3.0, "4:3"),
    (21.0 / 9.0, "21:9"),
    (1.85, "1.85:1"),
    (2.35, "2.35:1"),
    (2.39, "2.39:1"),
    (1.0, "1:1"),
    (3.0 / 2.0, "3:2"),
    (5.0 / 4.0, "5:4"),
    (16.0 / 10.0, "16:10"),
];

/// `1536` -> `"1.5 KB"`. Base 1024, at most two decimals.
pub fn file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut idx = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    idx = idx.min(SIZE_UNITS.len() - 1);
    let scaled = bytes as f64 / 1024f64.powi(idx as i32);
    format!("{} {}", trim_decimals(scaled, 2), SIZE_UNITS[idx])
}

/// Numeric durations are seconds, or milliseconds when above one hour's
/// worth of milliseconds. Already formatted strings pass through.
pub fn duration(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains('h') || raw.contains(':') {
        return raw.to_string();
    }
    let Ok(mut total) = raw.parse::<f64>() else {
        return raw.to_string();
    };
    if total > 3_600_000.0 {
        total /= 1000.0;
    }
    let total = total.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Maps a decimal display aspect ratio to the closest familiar notation.
pub fn aspect_ratio(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains(':') {
        return raw.to_string();
    }
    let Ok(value) = raw.parse::<f64>() else {
        return raw.to_string();
    };

    let (closest, diff) = COMMON_RATIOS
        .iter()
        .map(|(ratio, label)| (*label, (value - ratio).abs()))
        .fold((COMMON_RATIOS[0].1, f64::MAX), |best, cur| {
            if cur.1 < best.1 { cur } else { best }
        });
    if diff < 0.01 {
        return closest.to_string();
    }
    simplify_ratio(value).unwrap_or_else(|| format!("{value:.2}:1"))
}

fn simplify_ratio(value: f64) -> Option<String> {
    for den in 1u64..=20 {
        let num = (value * den as f64).round();
        if num < 1.0 {
            continue;
        }
        if (num / den as f64 - value).abs() < 0.005 {
            let num = num as u64;
            let g = gcd(num, den);
            let (n, d) = (num / g, den / g);
            if n <= 50 && d <= 50 {
                return Some(format!("{n}:{d}"));
            }
        }
    }
    None
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn trim_decimals(value: f64, places: usize) -> String {
    let s = format!("{value:.places$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Render a report field for display, keyed by its MediaInfo-style name.
pub fn value(key: &str, raw: &str) -> String {
    let numeric = raw.trim().parse::<f64>().ok();
    match (key, numeric) {
        ("Duration", _) => duration(raw),
        ("FileSize", Some(n)) => file_size(n as u64),
        ("BitRate" | "OverallBitRate", Some(n)) => format!("{} kbps", (n / 1000.0).round()),
        ("SamplingRate", Some(n)) => format!("{} kHz", (n / 1000.0).round()),
        ("FrameRate", Some(n)) => format!("{n:.3} fps"),
        ("Width" | "Height", Some(_)) => format!("{} px", raw.trim()),
        ("DisplayAspectRatio", _) => aspect_ratio(raw),
        _ => raw.to_string(),
    }
}
