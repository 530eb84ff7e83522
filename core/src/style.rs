use colored::{Color, ColoredString, Colorize};

use crate::testing::{complexity::ComplexityLabel, JudgeCode};

#[macro_export]
macro_rules! print_success {
    ($fmt:literal, $($e:tt)*) => {
        use ::colored::Colorize as _;
        println!("{}", format!($fmt, $($e)*).green())
    }
}

pub fn is_truecolor_supported() -> bool {
    let Ok(v) = std::env::var("COLORTERM") else {
        return false
    };
    matches!(v.as_str(), "truecolor" | "24bit")
}

pub trait ColorTheme {
    fn color(&self) -> Color;
}

impl ColorTheme for log::Level {
    fn color(&self) -> Color {
        use log::Level::*;
        match self {
            Error => Color::BrightRed,
            Warn => Color::BrightYellow,
            Info => Color::Cyan,
            Debug => Color::Magenta,
            Trace => Color::Blue,
        }
    }
}

impl ColorTheme for JudgeCode {
    fn color(&self) -> Color {
        use JudgeCode::*;
        if !self::is_truecolor_supported() {
            return match self {
                AC => Color::Green,
                WA => Color::Yellow,
                TLE => Color::Red,
                MLE => Color::Blue,
                RE => Color::Magenta,
            };
        }

        let (r, g, b) = match self {
            AC => (30, 180, 40),
            WA => (210, 138, 4),
            TLE => (220, 42, 42),
            MLE => (40, 100, 220),
            RE => (171, 40, 200),
        };
        Color::TrueColor { r, g, b }
    }
}

impl ColorTheme for ComplexityLabel {
    fn color(&self) -> Color {
        match self {
            ComplexityLabel::Class(_) => Color::BrightCyan,
            ComplexityLabel::Unknown | ComplexityLabel::InsufficientData => Color::BrightBlack,
        }
    }
}

pub fn judge_icon(judge: JudgeCode) -> ColoredString {
    let fg = if is_truecolor_supported() {
        Color::TrueColor {
            r: 255,
            g: 255,
            b: 255,
        }
    } else {
        Color::BrightBlack
    };
    format!(" {:<3} ", judge.to_string())
        .on_color(judge.color())
        .bold()
        .color(fg)
}

/// `1.5 KiB`, `12.0 MiB`, ...
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut v = bytes as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit + 1 < UNITS.len() {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", v, UNITS[unit])
    }
}

/// Milliseconds with one decimal, or `-` when there is no timing.
pub fn millis(ms: f64) -> String {
    if ms.is_finite() {
        format!("{:.1}ms", ms)
    } else {
        "-".to_owned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn human_bytes_picks_unit() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(12 * 1024 * 1024), "12.0 MiB");
        assert_eq!(human_bytes(3 << 40), "3072.0 GiB");
    }

    #[test]
    fn judge_icons_line_up() {
        use strum::IntoEnumIterator as _;
        for judge in JudgeCode::iter() {
            assert_eq!(judge_icon(judge).len(), 5, "{}", judge);
        }
    }

    #[test]
    fn millis_hides_nan() {
        assert_eq!(millis(1.26), "1.3ms");
        assert_eq!(millis(f64::NAN), "-");
    }
}
