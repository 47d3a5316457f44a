//! Eligibility guards. Each is a pure predicate over a definition, the
//! visitor context and the current time; they run in a fixed order and the
//! first failure rejects the definition.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use popup_core::types::{DeviceClass, Frequency, PopupDefinition, Schedule, Targeting, VisitorContext};
use popup_core::PopupResult;
use serde::Serialize;

use crate::display_state::DisplayStateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    Schedule,
    Frequency,
    Device,
    Page,
    Country,
}

/// Inclusive on both bounds.
pub fn schedule_allows(schedule: &Schedule, now: DateTime<FixedOffset>) -> bool {
    let now = now.with_timezone(&Utc);
    if let Some(start) = schedule.start {
        if now < start {
            return false;
        }
    }
    if let Some(end) = schedule.end {
        if now > end {
            return false;
        }
    }
    true
}

/// DAILY compares local calendar dates in the clock's offset; WEEKLY
/// compares elapsed time.
pub fn frequency_allows(
    frequency: Frequency,
    last_shown: Option<DateTime<FixedOffset>>,
    now: DateTime<FixedOffset>,
) -> bool {
    let Some(last) = last_shown else {
        return true;
    };
    match frequency {
        Frequency::Always => true,
        Frequency::Once => false,
        Frequency::Daily => last.with_timezone(now.offset()).date_naive() != now.date_naive(),
        Frequency::Weekly => now.signed_duration_since(last) >= Duration::weeks(1),
    }
}

pub fn device_allows(targeting: &Targeting, device: DeviceClass) -> bool {
    match &targeting.devices {
        Some(allowed) => allowed.contains(&device),
        None => true,
    }
}

/// Substring match against the page path.
pub fn page_allows(targeting: &Targeting, page: &str) -> bool {
    match &targeting.pages {
        Some(allowed) => allowed.iter().any(|p| page.contains(p.as_str())),
        None => true,
    }
}

/// Fails open when the country is unknown.
pub fn country_allows(targeting: &Targeting, country: Option<&str>) -> bool {
    match (&targeting.countries, country) {
        (Some(allowed), Some(country)) => allowed.iter().any(|c| c.eq_ignore_ascii_case(country)),
        _ => true,
    }
}

/// Runs every guard in order and returns the first one that fails, or
/// `None` when the definition is eligible. Storage errors propagate so the
/// caller can skip the definition.
pub fn first_failing_guard(
    definition: &PopupDefinition,
    context: &VisitorContext,
    now: DateTime<FixedOffset>,
    display_state: &DisplayStateStore,
) -> PopupResult<Option<Guard>> {
    if !schedule_allows(&definition.schedule, now) {
        return Ok(Some(Guard::Schedule));
    }
    // Only touch storage when the policy can actually suppress.
    if definition.frequency != Frequency::Always {
        let last = display_state.last_shown(&definition.id)?;
        if !frequency_allows(definition.frequency, last, now) {
            return Ok(Some(Guard::Frequency));
        }
    }
    if !device_allows(&definition.targeting, context.device) {
        return Ok(Some(Guard::Device));
    }
    if !page_allows(&definition.targeting, &context.page) {
        return Ok(Some(Guard::Page));
    }
    if !country_allows(&definition.targeting, context.country.as_deref()) {
        return Ok(Some(Guard::Country));
    }
    Ok(None)
}
