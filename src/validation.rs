//! Validation of loosely typed search arguments.
//!
//! Filters arriving as JSON (command line `--filter`, scripted callers) are
//! checked here before any query reaches the store.

use serde_json::Value;

use crate::errors::GpsReaderError;
use crate::models::{DateRange, SearchFilter};

/// Parse `{"vehicle": .., "driver": .., "between": [start, end]}`.
///
/// Missing keys and `null` values mean "no criterion".
pub fn parse_search_args(args: &Value) -> Result<SearchFilter, GpsReaderError> {
    let object = match args {
        Value::Object(object) => object,
        Value::Null => return Ok(SearchFilter::new()),
        other => {
            return Err(GpsReaderError::InvalidArgumentType {
                argument: "filter",
                expected: "object",
                found: type_name(other).to_string(),
            })
        }
    };

    let vehicle = text_argument("vehicle", object.get("vehicle"))?;
    let driver = text_argument("driver", object.get("driver"))?;
    let between = date_range_argument(object.get("between"))?;

    Ok(SearchFilter {
        vehicle,
        driver,
        between,
    })
}

fn text_argument(
    argument: &'static str,
    value: Option<&Value>,
) -> Result<Option<String>, GpsReaderError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(GpsReaderError::InvalidArgumentType {
            argument,
            expected: "str",
            found: type_name(other).to_string(),
        }),
    }
}

fn date_range_argument(value: Option<&Value>) -> Result<Option<DateRange>, GpsReaderError> {
    let items = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(GpsReaderError::InvalidArgumentType {
                argument: "between",
                expected: "list",
                found: type_name(other).to_string(),
            })
        }
    };

    if items.len() != 2 {
        return Err(GpsReaderError::InvalidDateRange(format!(
            "expected 2 elements, got {}",
            items.len()
        )));
    }

    let bounds = items
        .iter()
        .map(|item| match item {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(text.clone())),
            other => Err(GpsReaderError::InvalidArgumentType {
                argument: "between",
                expected: "list of str",
                found: format!("list containing {}", type_name(other)),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    DateRange::new(bounds).map(Some)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
