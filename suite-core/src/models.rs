// Data models for authenticated requests and schedule patterns

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::ScheduleError;

// Helper functions for Tz serialization
fn serialize_tz<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&tz.to_string())
}

fn deserialize_tz<'de, D>(deserializer: D) -> Result<Tz, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Tz::from_str(&s).map_err(serde::de::Error::custom)
}

/// Dates in the scheduler's `MM/DD/YYYY` format
mod mdy_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) const FORMAT: &str = "%m/%d/%Y";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

mod mdy_date_opt {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        date: &Option<NaiveDate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => super::mdy_date::serialize(date, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| {
                NaiveDate::parse_from_str(&s, super::mdy_date::FORMAT)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}

/// Times in the scheduler's `HH:MM` format
mod hm_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

mod hm_time_opt {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        time: &Option<NaiveTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match time {
            Some(time) => super::hm_time::serialize(time, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveTime>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| {
                NaiveTime::parse_from_str(&s, super::hm_time::FORMAT)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}

/// Minute intervals written as `HH:MM`
mod hm_minutes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(minutes: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:02}:{:02}", minutes / 60, minutes % 60))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let s = String::deserialize(deserializer)?;
        let (hours, minutes) = s
            .split_once(':')
            .ok_or_else(|| serde::de::Error::custom(format!("expected HH:MM, got '{}'", s)))?;
        let hours: u32 = hours.trim().parse().map_err(serde::de::Error::custom)?;
        let minutes: u32 = minutes.trim().parse().map_err(serde::de::Error::custom)?;
        if minutes >= 60 {
            return Err(serde::de::Error::custom(format!("minutes out of range in '{}'", s)));
        }
        hours
            .checked_mul(60)
            .and_then(|h| h.checked_add(minutes))
            .ok_or_else(|| serde::de::Error::custom(format!("interval too large: '{}'", s)))
    }
}

mod weekday_names {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(days: &Vec<Weekday>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(days.iter().map(|day| super::weekday_name(*day)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Weekday>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|name| super::parse_weekday(name).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Lowercase weekday name as the scheduler expects it
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

pub fn parse_weekday(name: &str) -> Result<Weekday, String> {
    match name.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        "saturday" | "sat" => Ok(Weekday::Sat),
        "sunday" | "sun" => Ok(Weekday::Sun),
        other => Err(format!("unknown weekday '{}'", other)),
    }
}

// ============================================================================
// Authenticated Request Models
// ============================================================================

/// HttpMethod represents the verbs the request wrapper issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Organizational scope a token is issued for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "tenant_id", rename_all = "snake_case")]
pub enum TenantContext {
    /// The automation's own tenant
    Source,
    /// A delegated tenant, identified by its tenant id
    CrossTenant(String),
}

impl fmt::Display for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantContext::Source => f.write_str("source"),
            TenantContext::CrossTenant(tenant_id) => write!(f, "cross-tenant:{}", tenant_id),
        }
    }
}

/// Cache key for bearer tokens
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenKey {
    pub tenant: TenantContext,
    pub delegated: bool,
}

impl TokenKey {
    /// Key for the automation's own tenant
    pub fn source(delegated: bool) -> Self {
        Self {
            tenant: TenantContext::Source,
            delegated,
        }
    }

    pub fn cross_tenant(tenant_id: impl Into<String>, delegated: bool) -> Self {
        Self {
            tenant: TenantContext::CrossTenant(tenant_id.into()),
            delegated,
        }
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.delegated {
            write!(f, "{}/delegated", self.tenant)
        } else {
            write!(f, "{}/application", self.tenant)
        }
    }
}

/// App registration and optional user account for one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Tokens are treated as expired this long before the authority says so
pub const TOKEN_EXPIRY_SKEW_SECONDS: i64 = 60;

/// A cached bearer credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub key: TokenKey,
    /// Incremented every time the token for `key` is regenerated
    pub generation: u64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Expired once `now` is within `TOKEN_EXPIRY_SKEW_SECONDS` of `expires_at`.
    /// Tokens without an expiry never expire here.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(TOKEN_EXPIRY_SKEW_SECONDS) >= expires_at,
            None => false,
        }
    }
}

/// Request payload: structured JSON or raw bytes passed through unchanged
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Raw(Vec<u8>),
}

impl RequestBody {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(RequestBody::Json(serde_json::to_value(value)?))
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            RequestBody::Json(value) => serde_json::to_vec(&value),
            RequestBody::Raw(bytes) => Ok(bytes),
        }
    }
}

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// Per-call options for `AuthenticatedExecutor::execute`
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Delegated tenant to authenticate against; None means the source tenant
    pub cross_tenant_details: Option<TenantCredentials>,
    /// Use the delegated (user) token instead of the application token
    pub delegated: bool,
    pub content_type: String,
    pub data: Option<RequestBody>,
    pub expected_status: u16,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            cross_tenant_details: None,
            delegated: false,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            data: None,
            expected_status: DEFAULT_EXPECTED_STATUS,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cross_tenant(mut self, details: TenantCredentials) -> Self {
        self.cross_tenant_details = Some(details);
        self
    }

    pub fn delegated(mut self, delegated: bool) -> Self {
        self.delegated = delegated;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.data = Some(RequestBody::Json(value));
        self
    }

    pub fn raw(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.data = Some(RequestBody::Raw(bytes.into()));
        self
    }

    pub fn expected_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    /// Cache key selected by the tenant context and delegation flag
    pub fn token_key(&self) -> TokenKey {
        match &self.cross_tenant_details {
            Some(details) => TokenKey::cross_tenant(details.tenant_id.clone(), self.delegated),
            None => TokenKey::source(self.delegated),
        }
    }
}

/// Response of an authenticated call, returned whether or not it matched
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

// ============================================================================
// Schedule Models
// ============================================================================

/// Recurrence class of a schedule pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    OneTime,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// Nth day class of the month, e.g. the second Tuesday
    MonthlyRelative,
    /// Nth day class of a fixed month each year
    YearlyRelative,
    Continuous,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::OneTime => "one_time",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
            Frequency::MonthlyRelative => "monthly_relative",
            Frequency::YearlyRelative => "yearly_relative",
            Frequency::Continuous => "continuous",
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, Frequency::MonthlyRelative | Frequency::YearlyRelative)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "one_time" | "onetime" => Ok(Frequency::OneTime),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" => Ok(Frequency::Yearly),
            "monthly_relative" => Ok(Frequency::MonthlyRelative),
            "yearly_relative" => Ok(Frequency::YearlyRelative),
            "continuous" => Ok(Frequency::Continuous),
            _ => Err(ScheduleError::UnknownFrequency(s.to_string())),
        }
    }
}

/// Which occurrence of a day class a relative pattern picks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeTime {
    First,
    Second,
    Third,
    Fourth,
    Last,
}

impl RelativeTime {
    /// Zero-based occurrence index; None for `Last`
    pub fn index(&self) -> Option<usize> {
        match self {
            RelativeTime::First => Some(0),
            RelativeTime::Second => Some(1),
            RelativeTime::Third => Some(2),
            RelativeTime::Fourth => Some(3),
            RelativeTime::Last => None,
        }
    }
}

/// Day class counted by a relative pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelativeDay {
    /// Any calendar day
    Day,
    /// Monday to Friday
    Weekday,
    /// Saturday or Sunday
    WeekendDay,
    /// One named day of the week
    On(Weekday),
}

impl RelativeDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelativeDay::Day => "day",
            RelativeDay::Weekday => "weekday",
            RelativeDay::WeekendDay => "weekend_day",
            RelativeDay::On(day) => weekday_name(*day),
        }
    }

    pub fn matches(&self, day: Weekday) -> bool {
        match self {
            RelativeDay::Day => true,
            RelativeDay::Weekday => !matches!(day, Weekday::Sat | Weekday::Sun),
            RelativeDay::WeekendDay => matches!(day, Weekday::Sat | Weekday::Sun),
            RelativeDay::On(named) => *named == day,
        }
    }
}

impl fmt::Display for RelativeDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelativeDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "day" => Ok(RelativeDay::Day),
            "weekday" => Ok(RelativeDay::Weekday),
            "weekend_day" | "weekendday" => Ok(RelativeDay::WeekendDay),
            other => parse_weekday(other).map(RelativeDay::On),
        }
    }
}

impl Serialize for RelativeDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RelativeDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Repeats within each scheduled day: every `repeat_every` minutes from the
/// start time up to `repeat_end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatPattern {
    #[serde(with = "hm_minutes")]
    pub repeat_every: u32,
    #[serde(with = "hm_time")]
    pub repeat_end: NaiveTime,
}

/// Schedule descriptor handed to the external scheduler's create call.
///
/// Field names follow the scheduler's pattern keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePattern {
    pub freq_type: Frequency,
    #[serde(with = "mdy_date")]
    pub active_start_date: NaiveDate,
    /// Absent for continuous schedules
    #[serde(default, with = "hm_time_opt", skip_serializing_if = "Option::is_none")]
    pub active_start_time: Option<NaiveTime>,
    #[serde(serialize_with = "serialize_tz", deserialize_with = "deserialize_tz")]
    pub time_zone: Tz,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_weeks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_months: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_years: Option<u32>,
    #[serde(default, with = "weekday_names", skip_serializing_if = "Vec::is_empty")]
    pub weekdays: Vec<Weekday>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_time: Option<RelativeTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_weekday: Option<RelativeDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_pattern: Option<RepeatPattern>,
    /// Days of the month on which the schedule does not run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exception_dates: Vec<u32>,
    /// Minutes between continuous runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_interval: Option<u32>,
    /// Stop after this many runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_after: Option<u32>,
    #[serde(default, with = "mdy_date_opt", skip_serializing_if = "Option::is_none")]
    pub active_end_date: Option<NaiveDate>,
}

/// Opaque reference to a schedule registered with the external scheduler
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleHandle {
    pub schedule_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ScheduleHandle {
    pub fn new(schedule_id: impl Into<String>) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            task_id: None,
            name: None,
        }
    }
}

impl fmt::Display for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if !name.is_empty() => write!(f, "{} ({})", name, self.schedule_id),
            _ => f.write_str(&self.schedule_id),
        }
    }
}

/// Opaque reference to one job started by a schedule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle {
    pub job_id: String,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.job_id)
    }
}

impl From<u64> for JobHandle {
    fn from(job_id: u64) -> Self {
        Self::new(job_id.to_string())
    }
}

impl From<&str> for JobHandle {
    fn from(job_id: &str) -> Self {
        Self::new(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_key_from_options() {
        let options = RequestOptions::new();
        assert_eq!(options.token_key(), TokenKey::source(false));

        let options = RequestOptions::new()
            .cross_tenant(TenantCredentials {
                tenant_id: "fabrikam".to_string(),
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                username: None,
                password: None,
            })
            .delegated(true);
        assert_eq!(options.token_key(), TokenKey::cross_tenant("fabrikam", true));
    }

    #[test]
    fn test_request_option_defaults() {
        let options = RequestOptions::default();
        assert_eq!(options.content_type, "application/json");
        assert_eq!(options.expected_status, 200);
        assert!(!options.delegated);
        assert!(options.data.is_none());
    }

    #[test]
    fn test_raw_body_passes_through() {
        let body = RequestBody::Raw(b"\x00\x01binary".to_vec());
        assert_eq!(body.into_bytes().unwrap(), b"\x00\x01binary".to_vec());
    }

    #[test]
    fn test_json_body_serializes() {
        let body = RequestBody::Json(json!({"displayName": "Team A"}));
        assert_eq!(
            body.into_bytes().unwrap(),
            br#"{"displayName":"Team A"}"#.to_vec()
        );
    }

    #[test]
    fn test_token_expiry_with_skew() {
        let now = Utc::now();
        let mut token = Token {
            access_token: "t".to_string(),
            key: TokenKey::source(false),
            generation: 1,
            issued_at: now,
            expires_at: None,
        };
        assert!(!token.is_expired(now));

        token.expires_at = Some(now + Duration::seconds(30));
        assert!(token.is_expired(now));

        token.expires_at = Some(now + Duration::seconds(3600));
        assert!(!token.is_expired(now));
    }

    #[test]
    fn test_frequency_parsing() {
        assert_eq!("monthly".parse::<Frequency>().unwrap(), Frequency::Monthly);
        assert_eq!("One_Time".parse::<Frequency>().unwrap(), Frequency::OneTime);
        assert_eq!("one-time".parse::<Frequency>().unwrap(), Frequency::OneTime);
        assert_eq!(
            "Monthly_Relative".parse::<Frequency>().unwrap(),
            Frequency::MonthlyRelative
        );
        assert!("fortnightly".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_relative_and_repeat_wire_format() {
        let pattern = SchedulePattern {
            freq_type: Frequency::YearlyRelative,
            active_start_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            active_start_time: NaiveTime::from_hms_opt(8, 0, 0),
            time_zone: chrono_tz::UTC,
            repeat_days: None,
            repeat_weeks: None,
            repeat_months: None,
            repeat_years: Some(1),
            weekdays: Vec::new(),
            on_day: None,
            on_month: Some(11),
            relative_time: Some(RelativeTime::Last),
            relative_weekday: Some(RelativeDay::WeekendDay),
            repeat_pattern: Some(RepeatPattern {
                repeat_every: 90,
                repeat_end: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
            }),
            exception_dates: vec![1, 15],
            job_interval: None,
            end_after: Some(4),
            active_end_date: None,
        };

        let value = serde_json::to_value(&pattern).unwrap();
        assert_eq!(value["freq_type"], json!("yearly_relative"));
        assert_eq!(value["relative_time"], json!("last"));
        assert_eq!(value["relative_weekday"], json!("weekend_day"));
        assert_eq!(
            value["repeat_pattern"],
            json!({"repeat_every": "01:30", "repeat_end": "23:59"})
        );
        assert_eq!(value["exception_dates"], json!([1, 15]));

        let parsed: SchedulePattern = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, pattern);
    }

    #[test]
    fn test_relative_day_names() {
        assert_eq!("Tuesday".parse::<RelativeDay>().unwrap(), RelativeDay::On(Weekday::Tue));
        assert_eq!("weekend day".parse::<RelativeDay>().unwrap(), RelativeDay::WeekendDay);
        assert!("someday".parse::<RelativeDay>().is_err());
        assert!(RelativeDay::Weekday.matches(Weekday::Fri));
        assert!(!RelativeDay::Weekday.matches(Weekday::Sun));
    }

    #[test]
    fn test_repeat_interval_rejects_bad_minutes() {
        let result: Result<RepeatPattern, _> =
            serde_json::from_value(json!({"repeat_every": "00:75", "repeat_end": "23:00"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_schedule_pattern_wire_format() {
        let pattern = SchedulePattern {
            freq_type: Frequency::Weekly,
            active_start_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            active_start_time: NaiveTime::from_hms_opt(9, 7, 0),
            time_zone: chrono_tz::UTC,
            repeat_days: None,
            repeat_weeks: Some(1),
            repeat_months: None,
            repeat_years: None,
            weekdays: vec![Weekday::Mon, Weekday::Fri],
            on_day: None,
            on_month: None,
            relative_time: None,
            relative_weekday: None,
            repeat_pattern: None,
            exception_dates: Vec::new(),
            job_interval: None,
            end_after: None,
            active_end_date: None,
        };

        let value = serde_json::to_value(&pattern).unwrap();
        assert_eq!(
            value,
            json!({
                "freq_type": "weekly",
                "active_start_date": "03/05/2024",
                "active_start_time": "09:07",
                "time_zone": "UTC",
                "repeat_weeks": 1,
                "weekdays": ["monday", "friday"]
            })
        );

        let parsed: SchedulePattern = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, pattern);
    }

    #[test]
    fn test_job_handle_is_transparent() {
        let handle = JobHandle::from(1234u64);
        assert_eq!(serde_json::to_value(&handle).unwrap(), json!("1234"));
    }

    #[test]
    fn test_response_header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let response = ApiResponse {
            status: 200,
            headers,
            body: br#"{"value": []}"#.to_vec(),
        };
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body, json!({"value": []}));
    }
}
