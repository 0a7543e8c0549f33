//! Built-in formula functions.
//!
//! Conventions:
//! - Formula-facing built-in names are ALL CAPS (e.g. `IIF`, `ROUND`); the
//!   preprocessor uppercases them so formulas may use any case.
//! - If you add a built-in, list it in `BUILTIN_NAMES` and register its
//!   implementation in `register_builtins`.
//! - Integer division yields a decimal, as table expressions expect
//!   (`7 / 2` is `3.5`). This relies on fast operators being disabled.

use rhai::{Dynamic, Engine, EvalAltResult, FLOAT, INT, Position};

pub(crate) const BUILTIN_NAMES: &[&str] = &[
    "IIF",
    "ISNULL",
    "LEN",
    "ROUND",
    "ABS",
    "TRIM",
    "SUBSTRING",
];

fn invalid_arg(message: &str) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(message.into(), Position::NONE).into()
}

fn to_decimal_places(value: INT) -> Result<i32, Box<EvalAltResult>> {
    const MAX_DECIMALS: INT = 12;
    if !(0..=MAX_DECIMALS).contains(&value) {
        return Err(invalid_arg(&format!(
            "decimals must be between 0 and {}",
            MAX_DECIMALS
        )));
    }
    Ok(value as i32)
}

fn round_to(x: FLOAT, decimals: i32) -> FLOAT {
    let factor = 10f64.powi(decimals);
    (x * factor).round() / factor
}

pub(crate) fn register_builtins(engine: &mut Engine) {
    engine.register_fn("/", |a: INT, b: INT| -> FLOAT { a as FLOAT / b as FLOAT });

    // IIF(cond, a, b)
    engine.register_fn("IIF", |cond: bool, a: Dynamic, b: Dynamic| -> Dynamic {
        if cond { a } else { b }
    });

    // ISNULL(value, replacement)
    engine.register_fn("ISNULL", |value: Dynamic, replacement: Dynamic| -> Dynamic {
        if value.is_unit() { replacement } else { value }
    });

    // LEN(value): character count of the value's text; null has length 0
    engine.register_fn("LEN", |value: Dynamic| -> INT {
        if value.is_unit() {
            0
        } else {
            value.to_string().chars().count() as INT
        }
    });

    engine.register_fn("ROUND", |x: FLOAT| -> FLOAT { x.round() });
    engine.register_fn("ROUND", |x: INT| -> INT { x });
    engine.register_fn(
        "ROUND",
        |x: FLOAT, decimals: INT| -> Result<FLOAT, Box<EvalAltResult>> {
            Ok(round_to(x, to_decimal_places(decimals)?))
        },
    );
    engine.register_fn(
        "ROUND",
        |x: INT, decimals: INT| -> Result<INT, Box<EvalAltResult>> {
            to_decimal_places(decimals)?;
            Ok(x)
        },
    );

    engine.register_fn("ABS", |x: FLOAT| -> FLOAT { x.abs() });
    engine.register_fn("ABS", |x: INT| -> Result<INT, Box<EvalAltResult>> {
        x.checked_abs()
            .ok_or_else(|| invalid_arg("ABS overflow"))
    });

    engine.register_fn("TRIM", |s: &str| -> String { s.trim().to_string() });

    // SUBSTRING(s, start, length): 1-based start
    engine.register_fn(
        "SUBSTRING",
        |s: &str, start: INT, length: INT| -> Result<String, Box<EvalAltResult>> {
            if start < 1 {
                return Err(invalid_arg("SUBSTRING start must be >= 1"));
            }
            if length < 0 {
                return Err(invalid_arg("SUBSTRING length must be >= 0"));
            }
            Ok(s.chars()
                .skip((start - 1) as usize)
                .take(length as usize)
                .collect())
        },
    );
}
