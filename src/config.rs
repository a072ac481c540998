use crate::advisory::ConditionalAdvisory;
use crate::board::BoardConfig;
use crate::line::{AfterClose, LineId, LineParams};
use crate::schedule::{
    MINUTES_PER_DAY, MinuteRange, SeasonalEvent, ServiceDay, TerminationWindow, Timetable,
    WeeklySchedule,
};
use chrono::{Month, Weekday};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_TICK_INTERVAL_MILLIS: u64 = 1000;
pub const DEFAULT_REMOTE_REFRESH_SECS: u64 = 300;
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    pub board: BoardSection,
    #[serde(default)]
    pub service: Vec<ServiceSection>,
    #[serde(default)]
    pub terminations: Vec<TerminationSection>,
    #[serde(default)]
    pub seasonal_event: Option<SeasonalEventSection>,
    pub lines: LinesSection,
    pub advisories: AdvisoriesSection,
    #[serde(default)]
    pub remote_advisories: Option<RemoteAdvisoriesSection>,
    #[serde(default)]
    pub display: Option<DisplaySection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
    /// Board tick period in milliseconds (default: 1000)
    pub tick_interval_millis: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BoardSection {
    /// IANA zone used for every time calculation, e.g. "Europe/London".
    pub timezone: String,
    pub approaching_threshold_secs: u32,
    #[serde(default)]
    pub after_close: AfterClose,
}

/// Operating hours shared by a group of weekdays.
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceSection {
    pub days: Vec<String>,
    pub start: String,
    pub end: String,
    pub last_approach: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TerminationSection {
    pub name: String,
    pub days: Vec<String>,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeasonalEventSection {
    pub name: String,
    pub months: Vec<String>,
    pub days: Vec<String>,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LinesSection {
    pub inner: LineSection,
    pub outer: LineSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LineSection {
    pub label: String,
    pub start_offset_secs: u32,
    pub cycle_secs: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdvisoriesSection {
    pub cycle_secs: u64,
    pub base: Vec<String>,
    #[serde(default)]
    pub conditional: Vec<ConditionalAdvisory>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteAdvisoriesSection {
    #[serde(default)]
    pub enabled: bool,
    /// Full CSV url; takes precedence over `sheet_id`.
    pub url: Option<String>,
    pub sheet_id: Option<String>,
    pub sheet_name: Option<String>,
    pub refresh_interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DisplaySection {
    /// Render every `0` as the letter `O` (board font has no slashed zero).
    #[serde(default)]
    pub zero_as_letter_o: bool,
}

/// Where remote advisories come from, once validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTarget {
    Url(String),
    GoogleSheet { sheet_id: String, sheet_name: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("invalid time for {field}: {value:?} (expected HH:MM)")]
    InvalidTime { field: String, value: String },
    #[error("invalid range for {field}: {reason}")]
    InvalidRange { field: String, reason: String },
    #[error("invalid weekday: {0:?}")]
    InvalidWeekday(String),
    #[error("invalid month: {0:?}")]
    InvalidMonth(String),
    #[error("no [[service]] entry covers {0}")]
    MissingServiceDay(String),
    #[error("{0} is covered by more than one [[service]] entry")]
    DuplicateServiceDay(String),
    #[error("invalid {line} line: {reason}")]
    InvalidLine { line: LineId, reason: String },
    #[error("invalid advisories: {0}")]
    InvalidAdvisory(String),
    #[error("invalid remote_advisories: {0}")]
    InvalidRemote(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Validate everything the board needs and build its configuration.
    pub fn board_config(&self) -> Result<BoardConfig, ConfigError> {
        let timezone = self.timezone()?;
        let timetable = Timetable {
            schedule: self.weekly_schedule()?,
            terminations: self.termination_windows()?,
            seasonal_event: self.seasonal_event.as_ref().map(parse_seasonal).transpose()?,
        };
        let inner = line_params(LineId::Inner, &self.lines.inner)?;
        let outer = line_params(LineId::Outer, &self.lines.outer)?;
        let threshold = self.board.approaching_threshold_secs;
        for (id, params) in [(LineId::Inner, &inner), (LineId::Outer, &outer)] {
            if threshold >= params.cycle_secs {
                return Err(ConfigError::InvalidLine {
                    line: id,
                    reason: format!(
                        "approaching_threshold_secs ({threshold}) must be below cycle_secs ({})",
                        params.cycle_secs
                    ),
                });
            }
        }

        if self.advisories.cycle_secs == 0 {
            return Err(ConfigError::InvalidAdvisory(
                "cycle_secs must be greater than zero".to_string(),
            ));
        }
        for advisory in &self.advisories.conditional {
            if let crate::advisory::AdvisoryTrigger::TerminationWindow {
                every_nth_cycle: 0, ..
            } = advisory.trigger
            {
                return Err(ConfigError::InvalidAdvisory(format!(
                    "every_nth_cycle must be at least 1 for {:?}",
                    advisory.text
                )));
            }
        }

        Ok(BoardConfig {
            timezone,
            timetable,
            inner,
            outer,
            approaching_threshold_secs: threshold,
            after_close: self.board.after_close,
            advisory_cycle: Duration::from_secs(self.advisories.cycle_secs),
            base_advisories: self.advisories.base.clone(),
            conditional_advisories: self.advisories.conditional.clone(),
        })
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.board
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.board.timezone.clone()))
    }

    fn weekly_schedule(&self) -> Result<WeeklySchedule, ConfigError> {
        let mut days: [Option<ServiceDay>; 7] = [None; 7];
        for (index, section) in self.service.iter().enumerate() {
            let field = format!("service[{index}]");
            let window = parse_range(&field, &section.start, &section.end)?;
            let last_approach =
                parse_minute_of_day(&format!("{field}.last_approach"), &section.last_approach)?;
            let service_day = ServiceDay {
                window,
                last_approach,
            };
            for day in &section.days {
                let weekday = parse_weekday(day)?;
                let slot = &mut days[weekday.num_days_from_sunday() as usize];
                if slot.is_some() {
                    return Err(ConfigError::DuplicateServiceDay(weekday.to_string()));
                }
                *slot = Some(service_day);
            }
        }

        let mut resolved = [ServiceDay::closed(); 7];
        for (index, day) in days.iter().enumerate() {
            resolved[index] = (*day).ok_or_else(|| {
                ConfigError::MissingServiceDay(weekday_from_sunday(index).to_string())
            })?;
        }
        Ok(WeeklySchedule::new(resolved))
    }

    fn termination_windows(&self) -> Result<Vec<TerminationWindow>, ConfigError> {
        self.terminations
            .iter()
            .map(|section| {
                Ok(TerminationWindow {
                    name: section.name.clone(),
                    days: parse_weekdays(&section.days)?,
                    range: parse_range(
                        &format!("terminations.{}", section.name),
                        &section.start,
                        &section.end,
                    )?,
                })
            })
            .collect()
    }

    pub fn remote_target(&self) -> Result<Option<RemoteTarget>, ConfigError> {
        let Some(section) = self.remote_advisories.as_ref().filter(|s| s.enabled) else {
            return Ok(None);
        };
        if let Some(url) = section.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(Some(RemoteTarget::Url(url.to_string())));
        }
        match section.sheet_id.as_deref().filter(|id| !id.trim().is_empty()) {
            Some(sheet_id) => Ok(Some(RemoteTarget::GoogleSheet {
                sheet_id: sheet_id.to_string(),
                sheet_name: section
                    .sheet_name
                    .clone()
                    .unwrap_or_else(|| "Sheet1".to_string()),
            })),
            None => Err(ConfigError::InvalidRemote(
                "enabled but neither url nor sheet_id is set".to_string(),
            )),
        }
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    /// Returns the board tick period (default: 1 second)
    pub fn tick_interval(&self) -> Duration {
        let millis = self
            .server
            .as_ref()
            .and_then(|s| s.tick_interval_millis)
            .filter(|millis| *millis > 0)
            .unwrap_or(DEFAULT_TICK_INTERVAL_MILLIS);
        Duration::from_millis(millis)
    }

    pub fn remote_refresh_interval(&self) -> Duration {
        let secs = self
            .remote_advisories
            .as_ref()
            .and_then(|s| s.refresh_interval_secs)
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_REMOTE_REFRESH_SECS);
        Duration::from_secs(secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        let secs = self
            .remote_advisories
            .as_ref()
            .and_then(|s| s.timeout_secs)
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub fn zero_as_letter_o(&self) -> bool {
        self.display.as_ref().is_some_and(|d| d.zero_as_letter_o)
    }

    /// Log level, falling back to info when unparseable.
    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

fn line_params(id: LineId, section: &LineSection) -> Result<LineParams, ConfigError> {
    if section.cycle_secs == 0 {
        return Err(ConfigError::InvalidLine {
            line: id,
            reason: "cycle_secs must be greater than zero".to_string(),
        });
    }
    if section.label.trim().is_empty() {
        return Err(ConfigError::InvalidLine {
            line: id,
            reason: "label must not be empty".to_string(),
        });
    }
    Ok(LineParams {
        label: section.label.clone(),
        start_offset_secs: section.start_offset_secs,
        cycle_secs: section.cycle_secs,
    })
}

fn parse_seasonal(section: &SeasonalEventSection) -> Result<SeasonalEvent, ConfigError> {
    let months = section
        .months
        .iter()
        .map(|month| parse_month(month))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SeasonalEvent {
        name: section.name.clone(),
        months,
        days: parse_weekdays(&section.days)?,
        range: parse_range(
            &format!("seasonal_event.{}", section.name),
            &section.start,
            &section.end,
        )?,
    })
}

fn parse_range(field: &str, start: &str, end: &str) -> Result<MinuteRange, ConfigError> {
    let start_minute = parse_minute_of_day(&format!("{field}.start"), start)?;
    let end_minute = parse_range_end(&format!("{field}.end"), end)?;
    if end_minute < start_minute {
        return Err(ConfigError::InvalidRange {
            field: field.to_string(),
            reason: format!("end {end} is before start {start}"),
        });
    }
    Ok(MinuteRange::new(start_minute, end_minute))
}

/// `"HH:MM"` (00:00 to 23:59) to minutes since midnight.
pub fn parse_minute_of_day(field: &str, value: &str) -> Result<u32, ConfigError> {
    parse_hhmm(field, value, false)
}

/// Like [`parse_minute_of_day`], but also accepts `24:00` as the end of the day.
pub fn parse_range_end(field: &str, value: &str) -> Result<u32, ConfigError> {
    parse_hhmm(field, value, true)
}

fn parse_hhmm(field: &str, value: &str, allow_end_of_day: bool) -> Result<u32, ConfigError> {
    let invalid = || ConfigError::InvalidTime {
        field: field.to_string(),
        value: value.to_string(),
    };
    let (hours, minutes) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 24 || minutes > 59 {
        return Err(invalid());
    }
    let total = hours * 60 + minutes;
    let limit = if allow_end_of_day {
        MINUTES_PER_DAY
    } else {
        MINUTES_PER_DAY - 1
    };
    if total > limit {
        return Err(invalid());
    }
    Ok(total)
}

fn parse_weekdays(values: &[String]) -> Result<Vec<Weekday>, ConfigError> {
    values.iter().map(|value| parse_weekday(value)).collect()
}

fn parse_weekday(value: &str) -> Result<Weekday, ConfigError> {
    value
        .trim()
        .parse::<Weekday>()
        .map_err(|_| ConfigError::InvalidWeekday(value.to_string()))
}

fn parse_month(value: &str) -> Result<u32, ConfigError> {
    let trimmed = value.trim();
    if let Ok(number) = trimmed.parse::<u32>() {
        return if (1..=12).contains(&number) {
            Ok(number)
        } else {
            Err(ConfigError::InvalidMonth(value.to_string()))
        };
    }
    trimmed
        .parse::<Month>()
        .map(|month| month.number_from_month())
        .map_err(|_| ConfigError::InvalidMonth(value.to_string()))
}

fn weekday_from_sunday(index: usize) -> Weekday {
    let mut day = Weekday::Sun;
    for _ in 0..index {
        day = day.succ();
    }
    day
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    const BASE_TOML: &str = r#"
[app]
name = "subway-board"

[logging]
level = "info"

[board]
timezone = "Europe/London"
approaching_threshold_secs = 10

[[service]]
days = ["sun"]
start = "10:00"
end = "18:30"
last_approach = "18:21"

[[service]]
days = ["mon", "tue", "wed", "thu", "fri", "sat"]
start = "06:30"
end = "23:30"
last_approach = "23:21"

[lines.inner]
label = "Inner"
start_offset_secs = 180
cycle_secs = 480

[lines.outer]
label = "Outer"
start_offset_secs = 480
cycle_secs = 480

[advisories]
cycle_secs = 25
base = ["Please Mind the Gap"]
"#;

    fn write_temp(name: &str, contents: &str) -> Result<std::path::PathBuf, Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("subway-board-{name}-{unique}.toml"));
        fs::write(&path, contents)?;
        Ok(path)
    }

    fn parse(contents: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    #[test]
    fn default_config_builds_board_config() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_default()?;
        let board = config.board_config()?;

        assert_eq!(board.timezone, chrono_tz::Europe::London);
        assert_eq!(board.inner.start_offset_secs, 180);
        assert_eq!(board.outer.start_offset_secs, 480);
        assert_eq!(board.advisory_cycle, Duration::from_secs(25));
        assert!(board.timetable.seasonal_event.is_some());
        assert_eq!(config.remote_target()?, None);
        Ok(())
    }

    #[test]
    fn minimal_config_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp("minimal", BASE_TOML)?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);
        let config = result?;

        assert_eq!(config.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert!(!config.zero_as_letter_o());
        let board = config.board_config()?;
        assert_eq!(
            board.timetable.service_day(Weekday::Sun).window,
            MinuteRange::new(600, 1110)
        );
        assert_eq!(board.after_close, AfterClose::ServiceComplete);
        Ok(())
    }

    #[test]
    fn missing_weekday_is_named() -> Result<(), Box<dyn std::error::Error>> {
        let contents = BASE_TOML.replace("\"fri\", \"sat\"", "\"fri\"");
        let config = parse(&contents)?;

        let result = config.board_config();

        match result {
            Err(ConfigError::MissingServiceDay(day)) => assert_eq!(day, "Sat"),
            other => panic!("expected missing Saturday, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn duplicate_weekday_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let contents = BASE_TOML.replace("days = [\"sun\"]", "days = [\"sun\", \"mon\"]");
        let config = parse(&contents)?;

        assert!(matches!(
            config.board_config(),
            Err(ConfigError::DuplicateServiceDay(_))
        ));
        Ok(())
    }

    #[test]
    fn unknown_timezone_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let contents = BASE_TOML.replace("Europe/London", "Europe/Atlantis");
        let config = parse(&contents)?;

        assert!(matches!(
            config.board_config(),
            Err(ConfigError::UnknownTimezone(_))
        ));
        Ok(())
    }

    #[test]
    fn bad_time_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let contents = BASE_TOML.replace("\"18:21\"", "\"18:61\"");
        let config = parse(&contents)?;

        assert!(matches!(
            config.board_config(),
            Err(ConfigError::InvalidTime { .. })
        ));
        Ok(())
    }

    #[test]
    fn threshold_must_fit_inside_cycle() -> Result<(), Box<dyn std::error::Error>> {
        let contents = BASE_TOML.replace("approaching_threshold_secs = 10", "approaching_threshold_secs = 480");
        let config = parse(&contents)?;

        assert!(matches!(
            config.board_config(),
            Err(ConfigError::InvalidLine { line: LineId::Inner, .. })
        ));
        Ok(())
    }

    #[test]
    fn conditional_advisories_parse_tagged_triggers() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!(
            "{BASE_TOML}\n{}",
            r#"
[[advisories.conditional]]
text = "NEXT INNER TERMINATES AT GOVAN"
slot = "a"
trigger = { when = "termination_window", line = "inner", every_nth_cycle = 3 }

[[advisories.conditional]]
text = "Football- system busy 1-6pm"
slot = "both"
trigger = { when = "seasonal_event" }
"#
        );
        let config = parse(&contents)?;
        let board = config.board_config()?;

        assert_eq!(
            board.conditional_advisories[0].trigger,
            crate::advisory::AdvisoryTrigger::TerminationWindow {
                line: LineId::Inner,
                every_nth_cycle: 3,
            }
        );
        assert_eq!(
            board.conditional_advisories[1].trigger,
            crate::advisory::AdvisoryTrigger::SeasonalEvent
        );
        Ok(())
    }

    #[test]
    fn seasonal_months_accept_names_and_numbers() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!(
            "{BASE_TOML}\n{}",
            r#"
[seasonal_event]
name = "football"
months = ["Aug", "september", "10", "Nov"]
days = ["Saturday"]
start = "13:00"
end = "18:00"
"#
        );
        let board = parse(&contents)?.board_config()?;

        let event = board.timetable.seasonal_event.ok_or("missing event")?;
        assert_eq!(event.months, vec![8, 9, 10, 11]);
        assert_eq!(event.days, vec![Weekday::Sat]);
        Ok(())
    }

    #[test]
    fn enabled_remote_without_target_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!("{BASE_TOML}\n[remote_advisories]\nenabled = true\n");
        let config = parse(&contents)?;

        assert!(matches!(
            config.remote_target(),
            Err(ConfigError::InvalidRemote(_))
        ));
        Ok(())
    }

    #[test]
    fn parses_end_of_day() {
        assert!(matches!(parse_range_end("end", "24:00"), Ok(1440)));
        assert!(matches!(parse_range_end("end", "23:59"), Ok(1439)));
        assert!(parse_range_end("end", "24:01").is_err());
        assert!(parse_range_end("end", "7").is_err());
    }

    #[test]
    fn oversized_hours_are_invalid_not_overflow() {
        assert!(matches!(
            parse_minute_of_day("service[0].start", "99999999:00"),
            Err(ConfigError::InvalidTime { .. })
        ));
        assert!(matches!(
            parse_range_end("service[0].end", "4294967295:59"),
            Err(ConfigError::InvalidTime { .. })
        ));
        assert!(parse_minute_of_day("start", "25:00").is_err());
    }

    #[test]
    fn end_of_day_is_only_valid_as_a_range_end() -> Result<(), Box<dyn std::error::Error>> {
        assert!(matches!(
            parse_minute_of_day("service[0].start", "24:00"),
            Err(ConfigError::InvalidTime { .. })
        ));

        let start = parse(&BASE_TOML.replace("start = \"10:00\"", "start = \"24:00\""))?;
        match start.board_config() {
            Err(ConfigError::InvalidTime { field, .. }) => assert_eq!(field, "service[0].start"),
            other => panic!("expected invalid start, got {other:?}"),
        }

        let last = parse(&BASE_TOML.replace("\"18:21\"", "\"24:00\""))?;
        match last.board_config() {
            Err(ConfigError::InvalidTime { field, .. }) => {
                assert_eq!(field, "service[0].last_approach")
            }
            other => panic!("expected invalid last_approach, got {other:?}"),
        }

        let end = parse(&BASE_TOML.replace("end = \"23:30\"", "end = \"24:00\""))?;
        let board = end.board_config()?;
        assert_eq!(board.timetable.service_day(Weekday::Mon).window.end, 1440);
        Ok(())
    }

    #[test]
    fn missing_config_file_returns_read_error() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("subway-board-missing-{unique}.toml"));

        let result = load_from_path(&path);

        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn invalid_toml_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp("invalid", "not = [valid")?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        Ok(())
    }
}
