//! Non-linear output mixer.
//!
//! Uses the standard rational approximation of the 2A03's resistor ladder:
//!
//! ```text
//! pulse_out = 95.88 / (8128 / (p1 + p2) + 100)
//! tnd_out   = 159.79 / (1 / (t/8227 + n/12241 + d/22638) + 100)
//! ```
//!
//! Output is `pulse_out + tnd_out` in `0.0..~1.0`.

pub(super) fn mix(pulse1: u8, pulse2: u8, triangle: u8, noise: u8, dmc: u8) -> f32 {
    let pulse_sum = f32::from(pulse1) + f32::from(pulse2);
    let pulse_out = if pulse_sum == 0.0 {
        0.0
    } else {
        95.88 / (8128.0 / pulse_sum + 100.0)
    };

    let tnd_sum = f32::from(triangle) / 8227.0
        + f32::from(noise) / 12241.0
        + f32::from(dmc) / 22638.0;
    let tnd_out = if tnd_sum == 0.0 {
        0.0
    } else {
        159.79 / (1.0 / tnd_sum + 100.0)
    };

    pulse_out + tnd_out
}

#[cfg(test)]
mod tests {
    use super::mix;

    #[test]
    fn silence_mixes_to_zero() {
        assert_eq!(mix(0, 0, 0, 0, 0), 0.0);
    }

    #[test]
    fn output_is_monotonic_and_bounded() {
        let quiet = mix(4, 0, 0, 0, 0);
        let loud = mix(15, 15, 15, 15, 127);
        assert!(quiet > 0.0);
        assert!(loud > quiet);
        assert!(loud < 1.0);
    }
}
