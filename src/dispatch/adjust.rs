//! Sentiment adjustment of raw model output

use crate::models::RawPrediction;
use crate::types::{PredictionPayload, SentimentVector};

/// Net sentiment above which a disagreeing direction is flipped
pub const FLIP_THRESHOLD: f64 = 0.4;

/// Bounded dampener applied to continuous predictions
///
/// `f(0) = 0`, otherwise `(1 / (1 + e^(1/x)) + min(0, sign(x))) / 4`.
/// Positive inputs land in `(0, 0.125)`, negative ones in `(-0.125, 0)`.
pub fn sentiment_dampener(x: f64) -> f64 {
    if x == 0.0 || x.is_nan() {
        return 0.0;
    }
    let logistic = 1.0 / (1.0 + (1.0 / x).exp());
    (logistic + x.signum().min(0.0)) / 4.0
}

/// Scale each of close/high/low by `1 + f(net)`
pub fn adjust_continuous(close: f64, high: f64, low: f64, net: f64) -> (f64, f64, f64) {
    let factor = 1.0 + sentiment_dampener(net);
    (close * factor, high * factor, low * factor)
}

/// Flip the direction only on a strong disagreeing sentiment
pub fn adjust_direction(direction: f64, net: f64) -> f64 {
    let disagree = direction != 0.0 && net != 0.0 && direction.signum() != net.signum();
    if disagree && net.abs() > FLIP_THRESHOLD {
        -direction
    } else {
        direction
    }
}

/// Apply the adjustment matching the prediction shape
pub fn apply_sentiment(raw: RawPrediction, sentiment: &SentimentVector) -> PredictionPayload {
    let net = sentiment.net();
    match raw {
        RawPrediction::Continuous { close, high, low } => {
            let (p_close, p_high, p_low) = adjust_continuous(close, high, low, net);
            PredictionPayload::Continuous {
                p_close,
                p_high,
                p_low,
            }
        }
        RawPrediction::Direction(direction) => PredictionPayload::Directional {
            p_direction: adjust_direction(direction, net),
        },
    }
}
