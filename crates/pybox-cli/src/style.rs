use std::env;

use color_eyre::owo_colors::OwoColorize;

pub struct Style {
    enabled: bool,
}

impl Style {
    pub fn new(force_no_color: bool, is_tty: bool) -> Self {
        let env_no_color = env::var_os("NO_COLOR").is_some();
        Self {
            enabled: !(force_no_color || env_no_color) && is_tty,
        }
    }

    pub fn ok(&self, text: &str) -> String {
        let line = format!("✔ {text}");
        if !self.enabled {
            return line;
        }
        line.green().bold().to_string()
    }

    pub fn failure(&self, text: &str) -> String {
        let line = format!("✖ {text}");
        if !self.enabled {
            return line;
        }
        line.red().bold().to_string()
    }

    pub fn table_header(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }
        text.bold().to_string()
    }
}
