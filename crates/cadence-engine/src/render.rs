// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Placeholder expansion and byte-budget truncation of message bodies.
//!
//! Truncation keeps the tracking link and the opt-out notice intact and
//! shortens only the free text around them.

use cadence_config::model::RenderConfig;
use cadence_core::{CadenceError, Contact};
use regex::Regex;
use tracing::warn;

/// Inserted between the shortened free text and the preserved parts.
const ELLIPSIS_SEP: &str = "... ";
const ELLIPSIS: &str = "...";

/// Renders templates against contacts within a byte budget.
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    max_bytes: usize,
    link: Regex,
    notice: String,
}

impl MessageRenderer {
    pub fn new(
        max_bytes: usize,
        link_pattern: &str,
        notice: impl Into<String>,
    ) -> Result<Self, CadenceError> {
        let link = Regex::new(link_pattern)
            .map_err(|e| CadenceError::Config(format!("invalid link pattern: {e}")))?;
        Ok(Self {
            max_bytes,
            link,
            notice: notice.into(),
        })
    }

    pub fn from_config(config: &RenderConfig) -> Result<Self, CadenceError> {
        Self::new(
            config.max_bytes,
            &config.link_pattern,
            config.opt_out_notice.clone(),
        )
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Expand placeholders and fit the result into the byte budget.
    pub fn render(&self, template: &str, contact: &Contact) -> String {
        self.fit(&expand(template, contact))
    }

    /// Fit an already-expanded body into the byte budget.
    pub fn fit(&self, body: &str) -> String {
        if body.len() <= self.max_bytes {
            return body.to_string();
        }

        match self.preserve_link_and_notice(body) {
            Some(fitted) => fitted,
            None => {
                warn!(
                    bytes = body.len(),
                    max_bytes = self.max_bytes,
                    "message lacks a tracking link or opt-out notice that fits; truncating flat"
                );
                let cut = floor_char_boundary(body, self.max_bytes.saturating_sub(ELLIPSIS.len()));
                format!("{}{ELLIPSIS}", &body[..cut])
            }
        }
    }

    fn preserve_link_and_notice(&self, body: &str) -> Option<String> {
        let link = self.link.find(body)?;
        let notice_start = body.find(self.notice.as_str())?;
        let notice = notice_start..notice_start + self.notice.len();
        if link.start() < notice.end && notice.start < link.end() {
            return None;
        }

        let reserved = link.len() + 1 + self.notice.len();
        let budget = self
            .max_bytes
            .checked_sub(reserved)?
            .checked_sub(ELLIPSIS_SEP.len())?;

        let (first, second) = if link.start() < notice.start {
            (link.range(), notice)
        } else {
            (notice, link.range())
        };
        let free = format!(
            "{}{}{}",
            &body[..first.start],
            &body[first.end..second.start],
            &body[second.end..]
        );

        let cut = floor_char_boundary(&free, budget);
        Some(format!(
            "{}{ELLIPSIS_SEP}{} {}",
            free[..cut].trim(),
            &body[first],
            &body[second]
        ))
    }
}

/// Largest index `<= max` that lies on a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut end = 0;
    for (idx, ch) in s.char_indices() {
        let next = idx + ch.len_utf8();
        if next > max {
            break;
        }
        end = next;
    }
    end
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Substitute every known placeholder. Unknown placeholders are left as-is.
pub fn expand(template: &str, contact: &Contact) -> String {
    let p = &contact.profile;
    let year = p.vehicle_year.map(|y| y.to_string()).unwrap_or_default();
    let lead_id = non_empty(&p.tracking_token).unwrap_or(&contact.id);

    let substitutions: [(&str, &str); 10] = [
        ("{FirstName}", non_empty(&p.first_name).unwrap_or("there")),
        ("{LastName}", non_empty(&p.last_name).unwrap_or("")),
        ("{VehicleYear}", &year),
        ("{VehicleMake}", non_empty(&p.vehicle_make).unwrap_or("your vehicle")),
        ("{VehicleModel}", non_empty(&p.vehicle_model).unwrap_or("")),
        ("{City}", non_empty(&p.city).unwrap_or("")),
        ("{State}", non_empty(&p.state).unwrap_or("")),
        ("{ZIP}", non_empty(&p.zip).unwrap_or("")),
        ("{Savings}", non_empty(&p.savings).unwrap_or("XXX")),
        ("{LeadID}", lead_id),
    ];

    substitutions
        .iter()
        .fold(template.to_string(), |body, (placeholder, value)| {
            body.replace(placeholder, value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{ContactProfile, ContactStatus};
    use chrono::Utc;
    use proptest::prelude::*;

    const NOTICE: &str = "\u{2013}Quoting Fast STOP";

    fn renderer() -> MessageRenderer {
        MessageRenderer::new(160, r"quotingfast\.io/[A-Za-z0-9]+", NOTICE).unwrap()
    }

    fn contact(profile: ContactProfile) -> Contact {
        Contact {
            id: "lead42".to_string(),
            phone: "+15550100".to_string(),
            timezone: "America/New_York".to_string(),
            status: ContactStatus::Active,
            created_at: Utc::now(),
            profile,
        }
    }

    #[test]
    fn missing_values_get_neutral_defaults() {
        let body = expand(
            "Hi {FirstName}{LastName}, your {VehicleMake} saves ${Savings} quotingfast.io/{LeadID}",
            &contact(ContactProfile::default()),
        );
        assert_eq!(body, "Hi there, your your vehicle saves $XXX quotingfast.io/lead42");
        assert!(!body.contains('{'));
    }

    #[test]
    fn tracking_token_replaces_contact_id() {
        let profile = ContactProfile {
            first_name: Some("Ana".to_string()),
            vehicle_year: Some(2021),
            tracking_token: Some("abc123".to_string()),
            ..ContactProfile::default()
        };
        let body = expand("{FirstName} {VehicleYear} quotingfast.io/{LeadID}", &contact(profile));
        assert_eq!(body, "Ana 2021 quotingfast.io/abc123");
    }

    #[test]
    fn blank_values_count_as_missing() {
        let profile = ContactProfile {
            first_name: Some("   ".to_string()),
            ..ContactProfile::default()
        };
        assert_eq!(expand("Hi {FirstName}", &contact(profile)), "Hi there");
    }

    #[test]
    fn short_body_is_unchanged() {
        let body = format!("Quote ready quotingfast.io/abc {NOTICE}");
        assert_eq!(renderer().fit(&body), body);
    }

    #[test]
    fn long_body_keeps_link_and_notice() {
        let filler = "Your refreshed quote includes new safe-driver and multi-car credits for drivers in your area, plus bundling options worth a look ";
        let body = format!("{filler}quotingfast.io/Xy12 today. {NOTICE}");
        assert!(body.len() > 160);

        let out = renderer().fit(&body);
        assert!(out.len() <= 160, "{} bytes: {out}", out.len());
        assert!(out.ends_with(&format!("... quotingfast.io/Xy12 {NOTICE}")), "{out}");
        assert!(out.starts_with("Your refreshed quote"));
    }

    #[test]
    fn notice_before_link_keeps_order() {
        let body = format!("{NOTICE} {} quotingfast.io/Zz9", "word ".repeat(40));
        let out = renderer().fit(&body);
        assert!(out.len() <= 160);
        assert!(out.ends_with(&format!("... {NOTICE} quotingfast.io/Zz9")), "{out}");
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundaries() {
        let body = format!("{} quotingfast.io/Ab1 {NOTICE}", "🚗 savings ".repeat(20));
        let out = renderer().fit(&body);
        assert!(out.len() <= 160);
        assert!(out.contains("quotingfast.io/Ab1"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn missing_link_falls_back_to_flat_truncation() {
        let body = format!("{} {NOTICE}", "no link here ".repeat(20));
        let out = renderer().fit(&body);
        assert!(out.len() <= 160);
        assert!(out.ends_with("..."));
        assert!(logs_contain("truncating flat"));
    }

    #[test]
    fn flat_truncation_respects_char_boundaries() {
        let r = MessageRenderer::new(10, "x^", NOTICE).unwrap();
        let out = r.fit("ééééééééé");
        assert_eq!(out, "ééé...");
    }

    proptest! {
        #[test]
        fn rendered_body_never_exceeds_budget(
            prefix in "\\PC{0,200}",
            token in "[A-Za-z0-9]{1,12}",
            suffix in "\\PC{0,60}",
            notice_first in any::<bool>(),
        ) {
            let link = format!("quotingfast.io/{token}");
            let body = if notice_first {
                format!("{prefix} {NOTICE} {suffix} {link}")
            } else {
                format!("{prefix} {link} {suffix} {NOTICE}")
            };
            let out = renderer().fit(&body);
            prop_assert!(out.len() <= 160, "{} bytes", out.len());
            if body.len() > 160 && !prefix.contains("quotingfast.io/") {
                prop_assert!(out.contains(&link), "link lost: {out}");
                prop_assert!(out.contains(NOTICE));
            }
        }
    }
}
