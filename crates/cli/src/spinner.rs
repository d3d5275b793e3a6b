use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Glyph cycles for the progress spinner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpinnerStyle {
    Circles,
    Dots,
    #[default]
    Bars,
    Symbols,
}

impl SpinnerStyle {
    pub fn from_index(index: u8) -> Option<SpinnerStyle> {
        match index {
            0 => Some(SpinnerStyle::Circles),
            1 => Some(SpinnerStyle::Dots),
            2 => Some(SpinnerStyle::Bars),
            3 => Some(SpinnerStyle::Symbols),
            _ => None,
        }
    }

    pub fn glyphs(&self) -> [&'static str; 5] {
        match self {
            SpinnerStyle::Circles => ["O", "o", "-", "o", "0"],
            SpinnerStyle::Dots => [".", "o", "O", "o", "."],
            SpinnerStyle::Bars => ["|", "/", "-", "\\", "-"],
            SpinnerStyle::Symbols => ["*", "#", "@", "%", "+"],
        }
    }
}

/// A single-character spinner ticking on a background thread after a
/// message, both drawn on stdout.
///
/// The line is erased when the spinner is stopped or dropped. Nothing is
/// drawn when stdout is not a terminal.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn start(message: &str, style: SpinnerStyle, interval: Duration) -> Spinner {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
        Spinner::with_bar(bar, message, style, interval)
    }

    pub fn is_hidden(&self) -> bool {
        self.bar.is_hidden()
    }

    fn with_bar(bar: ProgressBar, message: &str, style: SpinnerStyle, interval: Duration) -> Spinner {
        let glyphs = style.glyphs();
        // The last tick string is what indicatif shows once finished.
        let ticks = [glyphs[0], glyphs[1], glyphs[2], glyphs[3], glyphs[4], " "];
        bar.set_style(
            ProgressStyle::default_spinner()
                .tick_strings(&ticks)
                .template("{msg}{spinner}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(interval);
        Spinner { bar }
    }

    pub fn stop(self) {
        self.bar.finish_and_clear();
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
