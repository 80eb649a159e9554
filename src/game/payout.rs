use crate::config::FeeSchedule;

/// Fee rate applied to a cash-out at `multiplier`.
pub fn fee_rate(multiplier: f64, fees: &FeeSchedule) -> f64 {
    if multiplier < fees.min_free_multiplier { fees.fee } else { 0.0 }
}

/// `amount × multiplier × (1 − fee)`.
pub fn payout(amount: f64, multiplier: f64, fees: &FeeSchedule) -> f64 {
    amount * multiplier * (1.0 - fee_rate(multiplier, fees))
}

/// Payout minus the original stake. Negative when the fee outweighs the gain.
pub fn net_profit(amount: f64, multiplier: f64, fees: &FeeSchedule) -> f64 {
    payout(amount, multiplier, fees) - amount
}
