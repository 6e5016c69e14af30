use crate::settings::{ScrapeSettings, TransportKind};

/// Values given on the command line. `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub workers: Option<usize>,
    pub timeout: Option<f64>,
    pub retries: Option<u32>,
    pub save_every: Option<usize>,
    pub min_delay: Option<f64>,
    pub max_delay: Option<f64>,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub headless: Option<bool>,
    pub no_parallel: bool,
    pub max_pages: Option<u32>,
    pub settle_ms: Option<u64>,
    pub transport: Option<TransportKind>,
    pub base_url: Option<String>,
}

impl SettingsOverrides {
    pub fn apply(self, settings: &mut ScrapeSettings) {
        if let Some(v) = self.workers {
            settings.workers = v;
        }
        if let Some(v) = self.timeout {
            settings.timeout = v;
        }
        if let Some(v) = self.retries {
            settings.retries = v;
        }
        if let Some(v) = self.save_every {
            settings.save_every = v;
        }
        if let Some(v) = self.min_delay {
            settings.min_delay = v;
        }
        if let Some(v) = self.max_delay {
            settings.max_delay = v;
        }
        if self.start.is_some() {
            settings.start = self.start;
        }
        if self.end.is_some() {
            settings.end = self.end;
        }
        if let Some(v) = self.headless {
            settings.headless = v;
        }
        if self.no_parallel {
            settings.parallel = false;
        }
        if let Some(v) = self.max_pages {
            settings.max_pages = v;
        }
        if let Some(v) = self.settle_ms {
            settings.settle_ms = v;
        }
        if let Some(v) = self.transport {
            settings.transport = v;
        }
        if let Some(v) = self.base_url {
            settings.base_url = v;
        }
    }
}
