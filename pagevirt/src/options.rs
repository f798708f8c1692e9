use crate::{Error, Margin, Result};

pub const DEFAULT_MARGIN: f32 = 0.5;
pub const DEFAULT_MIN_PLACEHOLDER_HEIGHT: u32 = 24;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 800;
pub const DEFAULT_RECALL_CAPACITY: usize = 200;

/// Configuration for [`crate::Engine`].
///
/// Numeric fields are validated by [`EngineOptions::validate`]; the engine itself only ever
/// sees [`EngineOptions::sanitized`] output, so a bad value degrades to its default instead of
/// failing construction.
///
/// With `feature = "serde"`, this type implements `Serialize`/`Deserialize` and missing fields
/// take their defaults.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineOptions {
    /// Margin kept materialized above the visible region, as a fraction of viewport height.
    pub margin_top: f32,
    /// Margin kept materialized below the visible region, as a fraction of viewport height.
    pub margin_bottom: f32,

    /// Placeholder height used when a block measures as zero.
    pub min_placeholder_height: u32,

    /// Polling fallback interval.
    pub poll_interval_ms: u64,

    /// Artificial delay before an event-driven restore (0 = off). Diagnostics only.
    pub restore_delay_ms: u64,

    pub recall_capacity: usize,

    /// Ordered selectors for the discovery root. The document root is the implicit last
    /// fallback.
    pub content_roots: Vec<String>,

    pub enabled: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            margin_top: DEFAULT_MARGIN,
            margin_bottom: DEFAULT_MARGIN,
            min_placeholder_height: DEFAULT_MIN_PLACEHOLDER_HEIGHT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            restore_delay_ms: 0,
            recall_capacity: DEFAULT_RECALL_CAPACITY,
            content_roots: vec!["main".into(), "div[role='main']".into()],
            enabled: true,
        }
    }
}

fn valid_margin(m: f32) -> bool {
    m.is_finite() && m >= 0.0
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_margins(mut self, top: f32, bottom: f32) -> Self {
        self.margin_top = top;
        self.margin_bottom = bottom;
        self
    }

    pub fn with_min_placeholder_height(mut self, height: u32) -> Self {
        self.min_placeholder_height = height;
        self
    }

    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    pub fn with_restore_delay_ms(mut self, delay_ms: u64) -> Self {
        self.restore_delay_ms = delay_ms;
        self
    }

    pub fn with_recall_capacity(mut self, capacity: usize) -> Self {
        self.recall_capacity = capacity;
        self
    }

    pub fn with_content_roots<S: Into<String>>(
        mut self,
        roots: impl IntoIterator<Item = S>,
    ) -> Self {
        self.content_roots = roots.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !valid_margin(self.margin_top) {
            return Err(Error::Configuration(format!(
                "margin_top must be a non-negative number (got {})",
                self.margin_top
            )));
        }
        if !valid_margin(self.margin_bottom) {
            return Err(Error::Configuration(format!(
                "margin_bottom must be a non-negative number (got {})",
                self.margin_bottom
            )));
        }
        if self.min_placeholder_height == 0 {
            return Err(Error::Configuration(
                "min_placeholder_height must be positive".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Configuration(
                "poll_interval_ms must be positive".into(),
            ));
        }
        if self.recall_capacity == 0 {
            return Err(Error::Configuration(
                "recall_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Returns a copy where every invalid numeric field is reset to its default.
    pub fn sanitized(mut self) -> Self {
        let Err(_err) = self.validate() else {
            return self;
        };
        vwarn!(error = %_err, "EngineOptions: resetting invalid fields to defaults");

        if !valid_margin(self.margin_top) || !valid_margin(self.margin_bottom) {
            self.margin_top = DEFAULT_MARGIN;
            self.margin_bottom = DEFAULT_MARGIN;
        }
        if self.min_placeholder_height == 0 {
            self.min_placeholder_height = DEFAULT_MIN_PLACEHOLDER_HEIGHT;
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        }
        if self.recall_capacity == 0 {
            self.recall_capacity = DEFAULT_RECALL_CAPACITY;
        }
        self
    }

    /// Pixel margins for a viewport of the given height.
    pub fn margin_px(&self, viewport_height: u32) -> Margin {
        let h = viewport_height as f32;
        Margin {
            top: (self.margin_top * h).round() as u32,
            bottom: (self.margin_bottom * h).round() as u32,
        }
    }
}
