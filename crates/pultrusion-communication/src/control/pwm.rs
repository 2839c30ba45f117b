//! Slider to PWM mapping
//!
//! The motor drivers run on an inverted scale: slider 0 (stopped) is PWM
//! 255 and slider 100 (fastest) is PWM 1. There is no true zero; the
//! lowest duty the firmware ever receives is 1.

use pultrusion_core::ControlError;

/// Highest slider value
pub const SLIDER_MAX: u8 = 100;
/// PWM sent at full speed
pub const PWM_MIN: u8 = 1;
/// PWM sent at slider 0
pub const PWM_MAX: u8 = 255;

/// `round((100 - slider) / 100 * 254) + 1`, in integer arithmetic.
///
/// Values above 100 are treated as 100.
pub fn slider_to_pwm(slider: u8) -> u8 {
    let inverted = u32::from(SLIDER_MAX - slider.min(SLIDER_MAX));
    let scaled = (inverted * 254 + 50) / 100;
    (scaled + 1) as u8
}

/// Check a slider value coming from the UI
pub fn validate_slider(value: u32) -> Result<u8, ControlError> {
    u8::try_from(value)
        .ok()
        .filter(|slider| *slider <= SLIDER_MAX)
        .ok_or(ControlError::InvalidSpeed { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        assert_eq!(slider_to_pwm(0), PWM_MAX);
        assert_eq!(slider_to_pwm(100), PWM_MIN);
        assert_eq!(slider_to_pwm(50), 128);
    }

    #[test]
    fn test_half_rounds_up() {
        // 25 * 2.54 = 63.5
        assert_eq!(slider_to_pwm(75), 65);
    }

    #[test]
    fn test_validate() {
        assert_eq!(validate_slider(0), Ok(0));
        assert_eq!(validate_slider(100), Ok(100));
        assert_eq!(
            validate_slider(101),
            Err(ControlError::InvalidSpeed { value: 101 })
        );
        assert_eq!(
            validate_slider(70_000),
            Err(ControlError::InvalidSpeed { value: 70_000 })
        );
    }
}
