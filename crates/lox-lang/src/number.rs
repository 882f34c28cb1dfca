use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// The language's single numeric type, an IEEE-754 double.
#[derive(Debug, Clone, PartialEq, PartialOrd, Copy, Default)]
pub struct Number(f64);

impl Number {
    pub fn new(value: f64) -> Self {
        Number(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_int(&self) -> bool {
        self.0.is_finite() && self.0.fract() == 0.0
    }
}

impl Neg for Number {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Number(-self.0)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number(value)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number(value as f64)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_nan() {
            write!(f, "NaN")
        } else if self.0.is_infinite() {
            write!(f, "{}Infinity", if self.0 < 0.0 { "-" } else { "" })
        } else {
            // Integral values print without a fractional part.
            write!(f, "{}", self.0)
        }
    }
}

impl Add for Number {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Number(self.0 + other.0)
    }
}

impl Sub for Number {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Number(self.0 - other.0)
    }
}

impl Mul for Number {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Number(self.0 * other.0)
    }
}

impl Div for Number {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        Number(self.0 / other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(42.0, "42")]
    #[case(42.125, "42.125")]
    #[case(-42.0, "-42")]
    #[case(0.0, "0")]
    #[case(0.1, "0.1")]
    #[case(f64::INFINITY, "Infinity")]
    #[case(f64::NEG_INFINITY, "-Infinity")]
    #[case(f64::NAN, "NaN")]
    fn test_display_formatting(#[case] input: f64, #[case] expected: &str) {
        assert_eq!(Number::new(input).to_string(), expected);
    }

    #[rstest]
    #[case(5.0, 2.0, "7", "3", "10", "2.5")]
    #[case(-5.0, 2.0, "-3", "-7", "-10", "-2.5")]
    #[case(1.0, 0.0, "1", "1", "0", "Infinity")]
    fn test_operations(
        #[case] a: f64,
        #[case] b: f64,
        #[case] add_result: &str,
        #[case] sub_result: &str,
        #[case] mul_result: &str,
        #[case] div_result: &str,
    ) {
        let num_a = Number::new(a);
        let num_b = Number::new(b);

        assert_eq!((num_a + num_b).to_string(), add_result);
        assert_eq!((num_a - num_b).to_string(), sub_result);
        assert_eq!((num_a * num_b).to_string(), mul_result);
        assert_eq!((num_a / num_b).to_string(), div_result);
    }

    #[rstest]
    #[case(3.0, true)]
    #[case(3.5, false)]
    #[case(f64::INFINITY, false)]
    fn test_is_int(#[case] value: f64, #[case] expected: bool) {
        assert_eq!(Number::new(value).is_int(), expected);
    }
}
