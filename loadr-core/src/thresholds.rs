use std::time::Duration;

/// All expressions declared for one metric key such as `http_req_duration{status=200}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<ThresholdExpression>,
    /// Pass instead of fail when the metric has no samples.
    pub optional: bool,
}

impl ThresholdSet {
    pub fn new<I, S>(metric: impl Into<String>, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metric: metric.into(),
            expressions: expressions
                .into_iter()
                .map(ThresholdExpression::new)
                .collect(),
            optional: false,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpression {
    pub source: String,
    /// Stop the run as soon as this expression fails mid-run.
    pub abort_on_fail: bool,
    /// Mid-run checks of an abort threshold start only after this much run time.
    pub delay_abort_eval: Option<Duration>,
}

impl ThresholdExpression {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            abort_on_fail: false,
            delay_abort_eval: None,
        }
    }

    #[must_use]
    pub fn abort_on_fail(mut self, delay: Option<Duration>) -> Self {
        self.abort_on_fail = true;
        self.delay_abort_eval = delay;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ThresholdOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
}

impl ThresholdOp {
    pub fn compare(self, observed: f64, limit: f64) -> bool {
        match self {
            Self::Lt => observed < limit,
            Self::Lte => observed <= limit,
            Self::Gt => observed > limit,
            Self::Gte => observed >= limit,
            Self::Eq => observed == limit,
            Self::Ne => observed != limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Value,
    P(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

/// `name` plus the `{k=v,...}` tag filter of a threshold key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelector {
    pub name: String,
    pub tags: Vec<(String, String)>,
}

pub fn parse_metric_selector(raw: &str) -> Result<MetricSelector, String> {
    let raw = raw.trim();
    let Some(open) = raw.find('{') else {
        if raw.is_empty() {
            return Err("empty metric name".to_string());
        }
        return Ok(MetricSelector {
            name: raw.to_string(),
            tags: Vec::new(),
        });
    };

    let name = raw[..open].trim();
    let inner = raw[open + 1..]
        .strip_suffix('}')
        .ok_or_else(|| format!("unterminated tag selector in `{raw}`"))?;
    if name.is_empty() {
        return Err(format!("missing metric name in `{raw}`"));
    }

    let mut tags = Vec::new();
    for pair in inner.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (k, v) = pair
            .split_once(['=', ':'])
            .ok_or_else(|| format!("invalid tag filter `{pair}` in `{raw}` (expected key=value)"))?;
        let (k, v) = (k.trim(), v.trim().trim_matches('"'));
        if k.is_empty() {
            return Err(format!("empty tag key in `{raw}`"));
        }
        tags.push((k.to_string(), v.to_string()));
    }
    tags.sort();

    Ok(MetricSelector {
        name: name.to_string(),
        tags,
    })
}

pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Ne),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (pos, len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("missing comparison operator in `{raw}`"))?;

    let left = &s[..pos];
    let right = &s[pos + len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold `{raw}`"));
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "value" => ThresholdAgg::Value,
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| format!("unknown aggregation `{left}` in `{raw}`"))?;
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile `{inner}` in `{raw}`"))?;
            if !(p > 0.0 && p <= 100.0) {
                return Err(format!("percentile out of range (0, 100] in `{raw}`"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| format!("invalid numeric limit `{right}` in `{raw}`"))?;

    Ok(ThresholdExpr { agg, op, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(raw: &str) -> ThresholdExpr {
        parse_threshold_expr(raw).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn parses_whitespace_insensitively() {
        let e = expr("  avg  <=  123  ");
        assert_eq!(e.agg, ThresholdAgg::Avg);
        assert_eq!(e.op, ThresholdOp::Lte);
        assert_eq!(e.value, 123.0);
    }

    #[test]
    fn parses_fractional_percentiles() {
        assert_eq!(expr("p(99.9)<1500").agg, ThresholdAgg::P(99.9));
        assert_eq!(expr("p(95) < 500").agg, ThresholdAgg::P(95.0));
    }

    #[test]
    fn parses_all_operators() {
        assert_eq!(expr("rate<0.1").op, ThresholdOp::Lt);
        assert_eq!(expr("rate<=0.1").op, ThresholdOp::Lte);
        assert_eq!(expr("count>0").op, ThresholdOp::Gt);
        assert_eq!(expr("count>=1").op, ThresholdOp::Gte);
        assert_eq!(expr("value==3").op, ThresholdOp::Eq);
        assert_eq!(expr("med!=3").op, ThresholdOp::Ne);
    }

    #[test]
    fn rejects_bad_expressions() {
        for bad in ["", "p(95)", "p(0)<1", "p(101)<1", "pp(5)<1", "avg<abc", "<5", "rate<"] {
            assert!(parse_threshold_expr(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn strict_less_than_at_boundary() {
        let e = expr("rate<0.1");
        assert!(!e.op.compare(0.1, e.value));
        assert!(e.op.compare(0.0999, e.value));
    }

    #[test]
    fn selector_with_tags() {
        let s = parse_metric_selector("http_req_duration{ status = 200, group:Health }")
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(s.name, "http_req_duration");
        assert_eq!(
            s.tags,
            vec![
                ("group".to_string(), "Health".to_string()),
                ("status".to_string(), "200".to_string())
            ]
        );

        let plain = parse_metric_selector("errors").unwrap_or_else(|e| panic!("{e}"));
        assert!(plain.tags.is_empty());

        assert!(parse_metric_selector("x{status=200").is_err());
        assert!(parse_metric_selector("{a=b}").is_err());
        assert!(parse_metric_selector("x{novalue}").is_err());
    }
}
