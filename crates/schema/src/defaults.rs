//! Ready-made dynamic default producers.
//!
//! Use with [`Field::default_with`](crate::Field::default_with):
//!
//! ```ignore
//! Field::string().primary_key().ddl("varchar(50)").default_with(defaults::next_id)
//! ```

use chrono::Utc;
use uuid::Uuid;

use crate::Value;

/// Current time as fractional epoch seconds.
pub fn now() -> Value {
    let now = Utc::now();
    Value::Float(now.timestamp_micros() as f64 / 1_000_000.0)
}

/// Time-ordered unique id: 15-digit epoch milliseconds, a uuid4 in hex and a
/// `000` suffix (50 characters).
pub fn next_id() -> Value {
    let millis = Utc::now().timestamp_millis();
    Value::Text(format!("{:015}{}000", millis, Uuid::new_v4().simple()))
}

/// Look up a producer by the name used in declaration files.
pub fn by_name(name: &str) -> Option<fn() -> Value> {
    match name {
        "now" => Some(now),
        "next_id" => Some(next_id),
        _ => None,
    }
}
