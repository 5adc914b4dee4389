//! Equation visualization and analysis endpoints, backed by [`crate::trurl::TrurlSolver`].
//!
//! Grounded in `original_source`'s `equations.py` router: same four endpoints
//! and response shapes (curve sampling, crossover lookup, constraint lookup,
//! aggregate analysis), reworked around the arbitrary-precision solver
//! instead of Python's native `int`/`Decimal`.

use axum::extract::{Path as AxumPath, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rug::Integer;
use serde::Deserialize;

use crate::trurl::TrurlSolver;

fn parse_n(n: &str) -> Result<Integer, String> {
    let value = Integer::parse(n.trim())
        .map(Integer::from)
        .map_err(|_| format!("{n:?} is not a valid decimal integer"))?;
    if value < 2 {
        return Err("number must be >= 2".to_string());
    }
    Ok(value)
}

fn bad_request(message: impl Into<String>) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": message.into()}))).into_response()
}

/// log10 of a (possibly huge) integer, falling back to the digit-count proxy
/// this crate uses elsewhere once the value overflows `f64`.
fn log10_of(x: &Integer) -> f64 {
    if *x <= 0 {
        return 0.0;
    }
    let as_f64 = x.to_f64();
    if as_f64.is_finite() && as_f64 > 0.0 {
        as_f64.log10()
    } else {
        crate::exact_digits(x) as f64 - 1.0
    }
}

/// Inverse of [`log10_of`]: reconstruct an integer near `10^log_x`. Beyond
/// `f64`'s usable range this degrades to a bare power of ten, the same
/// precision loss [`crate::trurl::TrurlSolver::critical_x`] already accepts
/// for huge N.
fn pow10_near(log_x: f64) -> Integer {
    if log_x <= 18.0 {
        let value = 10f64.powf(log_x);
        if value.is_finite() && value >= 0.0 {
            return Integer::from(value as u64);
        }
    }
    Integer::from(10u32).pow(log_x.round().max(0.0) as u32)
}

#[derive(Deserialize)]
pub(super) struct CurveQuery {
    n: String,
    x_min: Option<String>,
    x_max: Option<String>,
    #[serde(default = "default_points")]
    points: u32,
}

fn default_points() -> u32 {
    500
}

/// `GET /equations/curve` — log-spaced sample of `y_of_x` over `[x_min, x_max]`.
pub(super) async fn handler_curve(Query(query): Query<CurveQuery>) -> impl IntoResponse {
    let n = match parse_n(&query.n) {
        Ok(n) => n,
        Err(e) => return bad_request(e),
    };
    let points = query.points.clamp(10, 2000);
    let solver = TrurlSolver::new(n.clone());
    let (default_lower, default_upper) = solver.initial_bounds();

    let x_min = match &query.x_min {
        Some(s) => match Integer::parse(s.trim()).map(Integer::from) {
            Ok(v) => v,
            Err(_) => return bad_request(format!("{s:?} is not a valid decimal integer")),
        },
        None => default_lower.clone(),
    };
    let x_max = match &query.x_max {
        Some(s) => match Integer::parse(s.trim()).map(Integer::from) {
            Ok(v) => v,
            Err(_) => return bad_request(format!("{s:?} is not a valid decimal integer")),
        },
        None => {
            // Cap the auto-derived upper bound so the default view stays a
            // sane visualization window rather than the full [lo, sqrt(N)] span.
            let capped = Integer::from(&x_min * 1000u32);
            std::cmp::min(default_upper.clone(), capped)
        }
    };
    if x_min >= x_max {
        return bad_request("x_min must be < x_max");
    }

    let log_min = log10_of(&x_min);
    let log_max = log10_of(&x_max);
    let step = (log_max - log_min) / (points as f64 - 1.0);

    let mut curve_points = Vec::with_capacity(points as usize);
    for i in 0..points {
        let log_x = log_min + i as f64 * step;
        let mut x = pow10_near(log_x);
        if x < x_min {
            x = x_min.clone();
        }
        if x > x_max {
            x = x_max.clone();
        }
        if x < 1 {
            continue;
        }
        let y = solver.y_of_x(&x);
        let constraint = solver.constraint(&x);
        let is_factor = n.is_divisible(&x);
        curve_points.push(serde_json::json!({
            "x": x.to_string(),
            "y": y.to_string(),
            "constraint": constraint,
            "is_candidate": (constraint - 2.0).abs() < 0.1,
            "is_factor": is_factor,
        }));
    }

    let crossover = solver.x_at_y_eq_1();
    let diag = solver.diagnostics(None);

    Json(serde_json::json!({
        "n": query.n,
        "x_min": x_min.to_string(),
        "x_max": x_max.to_string(),
        "points_requested": points,
        "points_computed": curve_points.len(),
        "curve_points": curve_points,
        "bounds": {
            "lower": default_lower.to_string(),
            "upper": default_upper.to_string(),
            "crossover": crossover.to_string(),
        },
        "diagnostic": {
            "digits": diag.digits,
            "sqrt_n": n.clone().sqrt().to_string(),
            "equation": "y = (((N^2/x) + x^2) / N)",
            "constraint_ideal": 2.0,
            "trurl_coefficient": diag.trurl_coefficient,
            "lower_bound_exponent": diag.lower_bound_exponent,
            "upper_bound_exponent": diag.upper_bound_exponent,
        },
    }))
    .into_response()
}

/// `GET /equations/find-x-when-y-one/{n}` — Trurl's first step: locate the
/// "general area" of the smaller factor before any division search begins.
pub(super) async fn handler_find_x_when_y_one(AxumPath(n_str): AxumPath<String>) -> impl IntoResponse {
    let n = match parse_n(&n_str) {
        Ok(n) => n,
        Err(e) => return bad_request(e),
    };
    let solver = TrurlSolver::new(n.clone());
    let x = solver.x_at_y_eq_1();
    let y = solver.constraint(&x);
    let n_digits = crate::exact_digits(&n);
    let x_digits = crate::exact_digits(&x);

    Json(serde_json::json!({
        "success": true,
        "n": n_str,
        "n_digits": n_digits,
        "x_when_y_equals_one": x.to_string(),
        "x_digits": x_digits,
        "x_exponent": log10_of(&x),
        "y_value_at_x": y,
        "y_close_to_one": (y - 1.0).abs() < 0.01,
        "equation": "y = ((((N^2/x) + x^2) / x) / N)",
        "explanation": "This x value represents the general area where the smaller factor is located",
    }))
    .into_response()
}

/// `GET /equations/compute-constraint/{n}/{x}` — Trurl's constraint equation
/// at one specific candidate `x`.
pub(super) async fn handler_compute_constraint(
    AxumPath((n_str, x_str)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    let n = match parse_n(&n_str) {
        Ok(n) => n,
        Err(e) => return bad_request(e),
    };
    let x = match Integer::parse(x_str.trim()).map(Integer::from) {
        Ok(v) => v,
        Err(_) => return bad_request(format!("{x_str:?} is not a valid decimal integer")),
    };
    if x < 1 {
        return bad_request("x must be >= 1");
    }

    let solver = TrurlSolver::new(n.clone());
    let y = solver.constraint(&x);
    let is_factor = n.is_divisible(&x);

    Json(serde_json::json!({
        "success": true,
        "n": n_str,
        "x": x_str,
        "y": y,
        "is_factor": is_factor,
        "equation": "y = ((((N^2/x) + x^2) / x) / N)",
        "interpretation": {
            "y_near_one": (y - 1.0).abs() < 0.1,
            "likely_close_to_factor": (y - 1.0).abs() < 0.1,
            "is_actual_factor": is_factor,
        },
    }))
    .into_response()
}

fn suggested_algorithms(digits: u64) -> Vec<&'static str> {
    if digits < 20 {
        vec!["trial_division", "pollard_rho"]
    } else if digits < 40 {
        vec!["pollard_rho", "ecm"]
    } else if digits < 60 {
        vec!["ecm", "equation_guided"]
    } else if digits < 90 {
        vec!["ecm", "equation_guided", "external_gnfs"]
    } else {
        vec!["ecm", "external_gnfs"]
    }
}

/// `GET /equations/analyze/{n}` — aggregate bounds, constraint diagnostics,
/// and a suggested algorithm ordering for this N's size.
pub(super) async fn handler_analyze(
    AxumPath(n_str): AxumPath<String>,
    Query(query): Query<AnalyzeQuery>,
) -> impl IntoResponse {
    let n = match parse_n(&n_str) {
        Ok(n) => n,
        Err(e) => return bad_request(e),
    };
    let test_x = match &query.test_x {
        Some(s) => match Integer::parse(s.trim()).map(Integer::from) {
            Ok(v) => Some(v),
            Err(_) => return bad_request(format!("{s:?} is not a valid decimal integer")),
        },
        None => None,
    };

    let solver = TrurlSolver::new(n.clone());
    let diag = solver.diagnostics(test_x.as_ref());
    let digits = diag.digits;

    Json(serde_json::json!({
        "n": n_str,
        "digits": digits,
        "bounds": {
            "lower": diag.lower_bound.to_string(),
            "upper": diag.upper_bound.to_string(),
            "crossover": diag.x_when_y_equals_one.to_string(),
        },
        "strategy": {
            "lower_bound": diag.lower_bound.to_string(),
            "upper_bound": diag.upper_bound.to_string(),
            "lower_bound_exponent": diag.lower_bound_exponent,
            "upper_bound_exponent": diag.upper_bound_exponent,
            "trurl_coefficient": diag.trurl_coefficient,
            "critical_point": diag.critical_point.to_string(),
        },
        "diagnostic": {
            "digits": diag.digits,
            "lower_bound_exponent": diag.lower_bound_exponent,
            "upper_bound_exponent": diag.upper_bound_exponent,
            "trurl_coefficient": diag.trurl_coefficient,
            "y_value_at_x": diag.y_value_at_x,
            "test": diag.test.map(|t| serde_json::json!({
                "x": t.x.to_string(),
                "computed_y": t.computed_y.to_string(),
                "constraint_value": t.constraint_value,
                "is_factor": t.is_factor,
                "all_constraints": t.all_constraints,
            })),
        },
        "recommendations": {
            "use_equation_guided": digits > 20,
            "suggested_algorithms": suggested_algorithms(digits),
        },
    }))
    .into_response()
}

#[derive(Deserialize)]
pub(super) struct AnalyzeQuery {
    test_x: Option<String>,
}
