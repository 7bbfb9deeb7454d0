/// Tick, price and liquidity conversions used during decoration
///
/// Raw prices are base-per-quote in on-chain units. Display prices apply the
/// decimal correction between the two tokens.

// ============================================================================
// Tick and Price
// ============================================================================

/// Price multiplier between adjacent ticks
pub const TICK_BASE: f64 = 1.0001;

/// Raw price at a tick: `1.0001^tick`
pub fn tick_to_price(tick: i32) -> f64 {
    TICK_BASE.powi(tick)
}

/// Largest tick whose price does not exceed `price`
pub fn price_to_tick(price: f64) -> Option<i32> {
    if !(price.is_finite() && price > 0.0) {
        return None;
    }
    let tick = (price.ln() / TICK_BASE.ln()).floor();
    if tick < i32::MIN as f64 || tick > i32::MAX as f64 {
        return None;
    }
    Some(tick as i32)
}

/// `10^(quote_decimals - base_decimals)`
pub fn decimal_correction(base_decimals: u8, quote_decimals: u8) -> f64 {
    10f64.powi(i32::from(quote_decimals) - i32::from(base_decimals))
}

/// Multiplicative inverse, zero for zero or non-finite input
pub fn invert(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        0.0
    } else {
        1.0 / value
    }
}

/// Convert a raw price into display units, optionally inverted (quote per base)
pub fn to_display_price(raw: f64, base_decimals: u8, quote_decimals: u8, inverted: bool) -> f64 {
    let display = raw * decimal_correction(base_decimals, quote_decimals);
    if inverted {
        invert(display)
    } else {
        display
    }
}

/// Convert a raw token quantity to display units
pub fn to_display_qty(raw: f64, decimals: u8) -> f64 {
    raw / 10f64.powi(i32::from(decimals))
}

// ============================================================================
// Liquidity Amounts
// ============================================================================

/// Token amounts (base, quote) of full range liquidity at a raw price
pub fn ambient_amounts(liquidity: f64, price: f64) -> (f64, f64) {
    if liquidity <= 0.0 || price <= 0.0 {
        return (0.0, 0.0);
    }
    let root = price.sqrt();
    (liquidity * root, liquidity / root)
}

/// Token amounts (base, quote) of concentrated liquidity between two ticks
pub fn concentrated_amounts(liquidity: f64, price: f64, bid_tick: i32, ask_tick: i32) -> (f64, f64) {
    if liquidity <= 0.0 || price <= 0.0 || bid_tick >= ask_tick {
        return (0.0, 0.0);
    }
    let lower = tick_to_price(bid_tick).sqrt();
    let upper = tick_to_price(ask_tick).sqrt();
    let current = price.sqrt();

    if current <= lower {
        (0.0, liquidity * (1.0 / lower - 1.0 / upper))
    } else if current >= upper {
        (liquidity * (upper - lower), 0.0)
    } else {
        (
            liquidity * (current - lower),
            liquidity * (1.0 / current - 1.0 / upper),
        )
    }
}

/// True when `tick` lies in `[bid_tick, ask_tick)`
pub fn is_tick_in_range(tick: i32, bid_tick: i32, ask_tick: i32) -> bool {
    tick >= bid_tick && tick < ask_tick
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn test_tick_zero_is_unit_price() {
        assert_eq!(tick_to_price(0), 1.0);
        assert_eq!(price_to_tick(1.0), Some(0));
    }

    #[test]
    fn test_price_to_tick_inverts_tick_to_price() {
        for tick in [-50_000, -1, 1, 887, 200_000] {
            let price = tick_to_price(tick) * 1.000_000_01;
            assert_eq!(price_to_tick(price), Some(tick));
        }
        assert_eq!(price_to_tick(0.0), None);
        assert_eq!(price_to_tick(f64::NAN), None);
    }

    #[test]
    fn test_display_price_decimal_correction() {
        // ETH (18) / USDC (6): raw 5e8 wei per USDC unit is 0.0005 ETH per USDC
        let display = to_display_price(5e8, 18, 6, false);
        assert!(close(display, 0.0005));
        assert!(close(to_display_price(5e8, 18, 6, true), 2000.0));
    }

    #[test]
    fn test_invert_zero() {
        assert_eq!(invert(0.0), 0.0);
        assert_eq!(invert(4.0), 0.25);
    }

    #[test]
    fn test_concentrated_amounts_regions() {
        let liq = 1_000.0;
        let (b, q) = concentrated_amounts(liq, tick_to_price(-200), -100, 100);
        assert!(b == 0.0 && q > 0.0);

        let (b, q) = concentrated_amounts(liq, tick_to_price(200), -100, 100);
        assert!(b > 0.0 && q == 0.0);

        let (b, q) = concentrated_amounts(liq, 1.0, -100, 100);
        assert!(b > 0.0 && q > 0.0);
    }

    #[test]
    fn test_ambient_amounts_at_unit_price() {
        let (b, q) = ambient_amounts(100.0, 1.0);
        assert!(close(b, 100.0) && close(q, 100.0));
        assert_eq!(ambient_amounts(0.0, 1.0), (0.0, 0.0));
    }

    #[test]
    fn test_tick_range_is_half_open() {
        assert!(is_tick_in_range(-100, -100, 100));
        assert!(!is_tick_in_range(100, -100, 100));
    }
}
