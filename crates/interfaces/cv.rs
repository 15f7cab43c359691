use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::InterfaceError;
use crate::geometry::{Color, Point, Region};

/// Match parameters for a single template lookup: an action's `threshold`
/// and `region`, if set, override the template's own defaults; this struct
/// carries the already-resolved values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchConfig {
    /// Minimum confidence in `[0.0, 1.0]` to count as a match.
    pub threshold: f32,
    /// Optional sub-region to search within; `None` searches the full frame.
    pub search_region: Option<Region>,
}

impl MatchConfig {
    /// Creates a config with the given threshold and no region override.
    #[must_use]
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            search_region: None,
        }
    }
}

/// Result of a template lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    /// Whether the template was found above threshold.
    pub found: bool,
    /// The match's location, if found.
    pub location: Option<Point>,
    /// The match's confidence score.
    pub confidence: f32,
}

impl TemplateMatch {
    /// A canonical "not found" result.
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            found: false,
            location: None,
            confidence: 0.0,
        }
    }

    /// A canonical "found" result at the given point.
    #[must_use]
    pub fn found_at(point: Point, confidence: f32) -> Self {
        Self {
            found: true,
            location: Some(point),
            confidence,
        }
    }
}

/// The visual-matching engine: given a named template and a search region,
/// reports found/not-found plus location and confidence, with a frame
/// cache. The matching algorithm itself is out of scope here.
#[async_trait]
pub trait Cv: Send + Sync {
    /// Looks up a template against the current (possibly cached) frame.
    async fn find_template(
        &self,
        name: &str,
        config: MatchConfig,
    ) -> Result<TemplateMatch, InterfaceError>;
    /// Polls `find_template` until it matches or `timeout` elapses.
    async fn wait_for_template(
        &self,
        name: &str,
        config: MatchConfig,
        timeout: Duration,
    ) -> Result<TemplateMatch, InterfaceError>;
    /// Forces the next `find_template` call to capture a fresh frame.
    fn invalidate_cache(&self);
    /// Samples a pixel and compares it to `color` within `tolerance`.
    async fn check_color(
        &self,
        point: Point,
        color: Color,
        tolerance: u8,
    ) -> Result<bool, InterfaceError>;
}

/// In-memory `Cv` fake: each template name has a scripted queue of
/// responses; calling `find_template` for a name pops its next scripted
/// response (repeating the last one once the queue is drained), so a test
/// can script "found, found, not-found" for an image-exists poll loop.
#[derive(Default)]
pub struct FakeCv {
    scripts: Mutex<IndexMap<String, VecDeque<TemplateMatch>>>,
    invalidations: Mutex<usize>,
}

impl FakeCv {
    /// Creates an empty fake; every unscripted template reports not-found.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a sequence of responses for a template name.
    #[must_use]
    pub fn with_responses(
        self,
        name: impl Into<String>,
        responses: impl IntoIterator<Item = TemplateMatch>,
    ) -> Self {
        self.scripts
            .lock()
            .insert(name.into(), responses.into_iter().collect());
        self
    }

    /// Number of times `invalidate_cache` has been called.
    #[must_use]
    pub fn invalidation_count(&self) -> usize {
        *self.invalidations.lock()
    }
}

#[async_trait]
impl Cv for FakeCv {
    async fn find_template(
        &self,
        name: &str,
        _config: MatchConfig,
    ) -> Result<TemplateMatch, InterfaceError> {
        let mut scripts = self.scripts.lock();
        let Some(queue) = scripts.get_mut(name) else {
            return Ok(TemplateMatch::not_found());
        };
        let next = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            *queue.front().unwrap_or(&TemplateMatch::not_found())
        };
        Ok(next)
    }

    async fn wait_for_template(
        &self,
        name: &str,
        config: MatchConfig,
        _timeout: Duration,
    ) -> Result<TemplateMatch, InterfaceError> {
        self.find_template(name, config).await
    }

    fn invalidate_cache(&self) {
        *self.invalidations.lock() += 1;
    }

    async fn check_color(
        &self,
        _point: Point,
        _color: Color,
        _tolerance: u8,
    ) -> Result<bool, InterfaceError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_pop_in_order_then_hold_last() {
        let cv = FakeCv::new().with_responses(
            "Enemy",
            vec![
                TemplateMatch::found_at(Point::new(1, 1), 0.9),
                TemplateMatch::found_at(Point::new(2, 2), 0.9),
                TemplateMatch::not_found(),
            ],
        );
        let config = MatchConfig::with_threshold(0.8);
        let first = cv.find_template("Enemy", config).await.unwrap();
        let second = cv.find_template("Enemy", config).await.unwrap();
        let third = cv.find_template("Enemy", config).await.unwrap();
        let fourth = cv.find_template("Enemy", config).await.unwrap();

        assert!(first.found && second.found);
        assert!(!third.found);
        assert!(!fourth.found, "queue holds its last scripted response");
    }

    #[tokio::test]
    async fn unscripted_template_reports_not_found() {
        let cv = FakeCv::new();
        let result = cv
            .find_template("Unknown", MatchConfig::with_threshold(0.8))
            .await
            .unwrap();
        assert!(!result.found);
    }
}
