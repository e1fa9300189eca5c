// Date/time derivation for record fields
// Author: Gabriel Demetrios Lafis

use std::fmt::Write;
use std::str::FromStr;

use chrono::{Datelike, Days, Duration, Local, Months, NaiveDate, NaiveDateTime, Timelike, Weekday};
use log::{debug, warn};

use crate::data::timestamp::{is_valid_format, parse_timestamp_with, DateOrder};
use crate::data::{Record, Value, DATETIME_CONFIG};
use crate::utils::EngineSettings;
use super::{
    decode_config, DateTimeConfig, DateTimeOperation, ErrorPolicy, Parameters, ProcessingError,
    ProcessorType, RecordProcessor,
};

/// Format used by `Format` when no `Format` parameter is given
pub const DEFAULT_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Named date/time operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeOperationKind {
    Format,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    DayOfWeek,
    MonthName,
    Quarter,
    DayOfYear,
    WeekOfYear,
    UnixTimestamp,
    Age,
    DateOnly,
    TimeOnly,
    Add,
    Truncate,
}

impl FromStr for DateTimeOperationKind {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use DateTimeOperationKind::*;

        let kind = match s.trim().to_lowercase().as_str() {
            "format" => Format,
            "year" => Year,
            "month" => Month,
            "day" => Day,
            "hour" => Hour,
            "minute" => Minute,
            "second" => Second,
            "dayofweek" => DayOfWeek,
            "monthname" => MonthName,
            "quarter" => Quarter,
            "dayofyear" => DayOfYear,
            "weekofyear" => WeekOfYear,
            "unixtimestamp" => UnixTimestamp,
            "age" => Age,
            "dateonly" => DateOnly,
            "timeonly" => TimeOnly,
            "add" => Add,
            "truncate" => Truncate,
            _ => {
                return Err(ProcessingError::Configuration(format!(
                    "unknown date/time operation '{}'",
                    s
                )))
            }
        };
        Ok(kind)
    }
}

/// Rule deciding which week is the first week of the year
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekRule {
    /// Week 1 is the week containing January 1st
    FirstDay,
    /// Week 1 starts on the first full week of the year
    FirstFullWeek,
    /// Week 1 is the first week with at least four days in the year
    FirstFourDayWeek,
}

impl FromStr for WeekRule {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "firstday" => Ok(WeekRule::FirstDay),
            "firstfullweek" => Ok(WeekRule::FirstFullWeek),
            "firstfourdayweek" => Ok(WeekRule::FirstFourDayWeek),
            _ => Err(ProcessingError::Configuration(format!("unknown week rule '{}'", s))),
        }
    }
}

/// Granularity for `Truncate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncateUnit {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl FromStr for TruncateUnit {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim().to_lowercase().as_str() {
            "year" => TruncateUnit::Year,
            "quarter" => TruncateUnit::Quarter,
            "month" => TruncateUnit::Month,
            "week" => TruncateUnit::Week,
            "day" => TruncateUnit::Day,
            "hour" => TruncateUnit::Hour,
            "minute" => TruncateUnit::Minute,
            "second" => TruncateUnit::Second,
            _ => {
                return Err(ProcessingError::Configuration(format!(
                    "unknown truncate unit '{}'",
                    s
                )))
            }
        };
        Ok(unit)
    }
}

/// Week number of a date under the given rule and first day of week
pub fn week_of_year(date: NaiveDate, rule: WeekRule, first_day: Weekday) -> u32 {
    let day_of_year = date.ordinal0() as i64;
    let date_offset = days_since_week_start(date.weekday(), first_day);
    // position of January 1st within its week
    let jan1_offset = (date_offset - day_of_year).rem_euclid(7);

    let first_week_start = match rule {
        WeekRule::FirstDay => -jan1_offset,
        WeekRule::FirstFullWeek if jan1_offset == 0 => 0,
        WeekRule::FirstFullWeek => 7 - jan1_offset,
        WeekRule::FirstFourDayWeek if 7 - jan1_offset >= 4 => -jan1_offset,
        WeekRule::FirstFourDayWeek => 7 - jan1_offset,
    };

    if day_of_year < first_week_start {
        return date
            .checked_sub_days(Days::new(day_of_year as u64 + 1))
            .map_or(1, |previous| week_of_year(previous, rule, first_day));
    }

    ((day_of_year - first_week_start) / 7 + 1) as u32
}

fn days_since_week_start(day: Weekday, first_day: Weekday) -> i64 {
    (day.num_days_from_monday() as i64 - first_day.num_days_from_monday() as i64).rem_euclid(7)
}

/// Whole years elapsed between a date and a reference date
pub fn age_in_years(birth: NaiveDate, today: NaiveDate) -> i64 {
    let mut years = (today.year() - birth.year()) as i64;
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years
}

/// Shift a timestamp by calendar and clock offsets
pub fn add_offsets(ts: NaiveDateTime, params: &Parameters) -> Option<NaiveDateTime> {
    let months = params
        .get_i64("Years")
        .unwrap_or(0)
        .checked_mul(12)?
        .checked_add(params.get_i64("Months").unwrap_or(0))?;
    let month_step = Months::new(u32::try_from(months.unsigned_abs()).ok()?);

    let shifted = if months >= 0 {
        ts.checked_add_months(month_step)?
    } else {
        ts.checked_sub_months(month_step)?
    };

    let millis = params.get_f64("Days").unwrap_or(0.0) * 86_400_000.0
        + params.get_f64("Hours").unwrap_or(0.0) * 3_600_000.0
        + params.get_f64("Minutes").unwrap_or(0.0) * 60_000.0
        + params.get_f64("Seconds").unwrap_or(0.0) * 1_000.0;

    if !millis.is_finite() || millis.abs() > 1.0e15 {
        return None;
    }

    shifted.checked_add_signed(Duration::milliseconds(millis.round() as i64))
}

/// Truncate a timestamp to the start of the given unit
pub fn truncate(ts: NaiveDateTime, unit: TruncateUnit, first_day: Weekday) -> Option<NaiveDateTime> {
    let date = ts.date();

    match unit {
        TruncateUnit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)?.and_hms_opt(0, 0, 0),
        TruncateUnit::Quarter => {
            let month = (date.month() - 1) / 3 * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), month, 1)?.and_hms_opt(0, 0, 0)
        }
        TruncateUnit::Month => {
            NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?.and_hms_opt(0, 0, 0)
        }
        TruncateUnit::Week => {
            let back = days_since_week_start(date.weekday(), first_day) as u64;
            date.checked_sub_days(Days::new(back))?.and_hms_opt(0, 0, 0)
        }
        TruncateUnit::Day => date.and_hms_opt(0, 0, 0),
        TruncateUnit::Hour => date.and_hms_opt(ts.hour(), 0, 0),
        TruncateUnit::Minute => date.and_hms_opt(ts.hour(), ts.minute(), 0),
        TruncateUnit::Second => date.and_hms_opt(ts.hour(), ts.minute(), ts.second()),
    }
}

fn first_day_param(params: &Parameters) -> Result<Weekday, ProcessingError> {
    match params.get_str("FirstDayOfWeek") {
        None => Ok(Weekday::Sun),
        Some(name) => Weekday::from_str(name.trim()).map_err(|_| {
            ProcessingError::Configuration(format!("unknown first day of week '{}'", name))
        }),
    }
}

/// Date/time processor deriving temporal fields
pub struct DateTimeProcessor {
    include_on_error: bool,
    reference_date: Option<NaiveDate>,
}

impl DateTimeProcessor {
    /// Create a processor reading `DateTimeConfig` from the batch metadata
    pub fn new() -> Self {
        DateTimeProcessor {
            include_on_error: false,
            reference_date: None,
        }
    }

    /// Create a processor using engine settings
    pub fn with_settings(settings: &EngineSettings) -> Self {
        DateTimeProcessor {
            include_on_error: settings.include_on_error,
            reference_date: None,
        }
    }

    /// Compute `Age` relative to a fixed date instead of today
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Apply the operations to one record, failing on the first unparseable value
    pub fn apply_operations(
        &self,
        record: &Record,
        operations: &[(String, DateTimeOperation)],
    ) -> Result<Record, ProcessingError> {
        let (output, mut errors) = self.transform(record, operations);
        if errors.is_empty() {
            Ok(output)
        } else {
            Err(errors.remove(0))
        }
    }

    /// Apply every operation, collecting per-record errors instead of stopping
    fn transform(
        &self,
        record: &Record,
        operations: &[(String, DateTimeOperation)],
    ) -> (Record, Vec<ProcessingError>) {
        let mut output = record.clone();
        let mut errors = Vec::new();

        for (field, operation) in operations {
            let kind = match operation.operation.parse::<DateTimeOperationKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    warn!("Date/time operation on '{}' skipped: {}", field, e);
                    continue;
                }
            };

            let value = match record.get(field) {
                Some(value) if !value.is_null() => value,
                _ => {
                    debug!("Record {}: no value for '{}', skipped", record.id(), field);
                    continue;
                }
            };

            let order = DateOrder::from_culture(operation.input_culture.as_deref());
            let parsed = match value {
                Value::Timestamp(ts) => Some(*ts),
                Value::String(s) => parse_timestamp_with(s, operation.input_format.as_deref(), order),
                _ => None,
            };

            let ts = match parsed {
                Some(ts) => ts,
                None => {
                    errors.push(ProcessingError::record(
                        record,
                        format!("field '{}' value '{}' is not a valid date/time", field, value),
                    ));
                    continue;
                }
            };

            match self.derive(kind, ts, &operation.parameters) {
                Ok(result) => {
                    let target = match operation.new_field_name.as_deref() {
                        Some(name) if operation.create_new_field && !name.is_empty() => {
                            name.to_string()
                        }
                        _ if operation.create_new_field => {
                            format!("{}_{}", field, operation.operation)
                        }
                        _ => field.clone(),
                    };
                    output.set(target, result);
                }
                Err(ProcessingError::Configuration(msg)) => {
                    warn!("Date/time operation on '{}' skipped: {}", field, msg);
                }
                Err(ProcessingError::Record { message, .. }) => {
                    errors.push(ProcessingError::record(
                        record,
                        format!("field '{}': {}", field, message),
                    ));
                }
                Err(e) => errors.push(e),
            }
        }

        (output, errors)
    }

    /// Derive the value of one operation from a parsed timestamp
    pub fn derive(
        &self,
        kind: DateTimeOperationKind,
        ts: NaiveDateTime,
        params: &Parameters,
    ) -> Result<Value, ProcessingError> {
        let value = match kind {
            DateTimeOperationKind::Format => {
                let format = params.get_str("Format").unwrap_or(DEFAULT_OUTPUT_FORMAT);
                if !is_valid_format(format) {
                    return Err(ProcessingError::Configuration(format!(
                        "invalid output format '{}'",
                        format
                    )));
                }
                let mut rendered = String::new();
                write!(rendered, "{}", ts.format(format)).map_err(|_| {
                    ProcessingError::Configuration(format!(
                        "output format '{}' cannot be rendered without a time zone",
                        format
                    ))
                })?;
                Value::String(rendered)
            }
            DateTimeOperationKind::Year => Value::Integer(ts.year() as i64),
            DateTimeOperationKind::Month => Value::Integer(ts.month() as i64),
            DateTimeOperationKind::Day => Value::Integer(ts.day() as i64),
            DateTimeOperationKind::Hour => Value::Integer(ts.hour() as i64),
            DateTimeOperationKind::Minute => Value::Integer(ts.minute() as i64),
            DateTimeOperationKind::Second => Value::Integer(ts.second() as i64),
            DateTimeOperationKind::DayOfWeek => Value::String(ts.format("%A").to_string()),
            DateTimeOperationKind::MonthName => Value::String(ts.format("%B").to_string()),
            DateTimeOperationKind::Quarter => Value::Integer(((ts.month() - 1) / 3 + 1) as i64),
            DateTimeOperationKind::DayOfYear => Value::Integer(ts.ordinal() as i64),
            DateTimeOperationKind::WeekOfYear => {
                let rule = match params.get_str("Rule") {
                    Some(rule) => rule.parse::<WeekRule>()?,
                    None => WeekRule::FirstDay,
                };
                let first_day = first_day_param(params)?;
                Value::Integer(week_of_year(ts.date(), rule, first_day) as i64)
            }
            DateTimeOperationKind::UnixTimestamp => Value::Integer(ts.and_utc().timestamp()),
            DateTimeOperationKind::Age => Value::Integer(age_in_years(ts.date(), self.today())),
            DateTimeOperationKind::DateOnly => Value::String(ts.format("%Y-%m-%d").to_string()),
            DateTimeOperationKind::TimeOnly => Value::String(ts.format("%H:%M:%S").to_string()),
            DateTimeOperationKind::Add => match add_offsets(ts, params) {
                Some(shifted) => Value::Timestamp(shifted),
                None => {
                    return Err(ProcessingError::Record {
                        record_id: 0,
                        message: "date/time offset out of range".to_string(),
                    })
                }
            },
            DateTimeOperationKind::Truncate => {
                let unit = match params.get_str("Unit") {
                    Some(unit) => unit.parse::<TruncateUnit>()?,
                    None => TruncateUnit::Day,
                };
                let first_day = first_day_param(params)?;
                match truncate(ts, unit, first_day) {
                    Some(truncated) => Value::Timestamp(truncated),
                    None => {
                        return Err(ProcessingError::Record {
                            record_id: 0,
                            message: "truncated date out of range".to_string(),
                        })
                    }
                }
            }
        };

        Ok(value)
    }

    /// Apply the operations to every record under an error policy
    pub fn process_with(
        &self,
        input: &[Record],
        operations: &[(String, DateTimeOperation)],
        policy: ErrorPolicy,
    ) -> Vec<Record> {
        let mut result = Vec::with_capacity(input.len());

        for record in input {
            let (mut output, errors) = self.transform(record, operations);
            if errors.is_empty() {
                result.push(output);
                continue;
            }

            if policy.include_on_error {
                for error in &errors {
                    output.metadata.push_error(error.to_string());
                }
                result.push(output);
            } else {
                debug!("Dropping record {}: {}", record.id(), errors[0]);
            }
        }

        result
    }
}

impl Default for DateTimeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordProcessor for DateTimeProcessor {
    fn process(&self, input: &[Record]) -> Result<Vec<Record>, ProcessingError> {
        let config: DateTimeConfig = match decode_config(input, DATETIME_CONFIG) {
            Ok(Some(config)) => config,
            Ok(None) => {
                warn!("Date/time operations skipped: no {} found on batch", DATETIME_CONFIG);
                return Ok(input.to_vec());
            }
            Err(ProcessingError::Configuration(msg)) => {
                warn!("Date/time operations skipped: {}", msg);
                return Ok(input.to_vec());
            }
            Err(e) => return Err(e),
        };

        let policy = ErrorPolicy::new(config.include_on_error.unwrap_or(self.include_on_error));
        Ok(self.process_with(input, &config.operations, policy))
    }

    fn name(&self) -> &str {
        "datetime"
    }

    fn processor_type(&self) -> ProcessorType {
        ProcessorType::DateTime
    }
}
