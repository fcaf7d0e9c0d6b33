//! One-time codes gating pickup and drop.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const OTP_DIGITS: usize = 4;

pub trait OtpGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Uniform 4-digit codes. Seeded generators are reproducible.
#[derive(Debug)]
pub struct RandomOtp {
    rng: Mutex<StdRng>,
}

impl RandomOtp {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }
}

impl OtpGenerator for RandomOtp {
    fn generate(&self) -> String {
        let code: u32 = self.rng.lock().gen_range(0..10_000);
        format!("{code:04}")
    }
}

/// Exact, whole-string comparison; no trimming or numeric coercion.
pub fn otp_matches(stored: &str, supplied: &str) -> bool {
    stored.len() == supplied.len()
        && stored
            .bytes()
            .zip(supplied.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

pub fn is_well_formed(otp: &str) -> bool {
    otp.len() == OTP_DIGITS && otp.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_four_digits() {
        let otp = RandomOtp::from_entropy();
        for _ in 0..200 {
            assert!(is_well_formed(&otp.generate()));
        }
    }

    #[test]
    fn seeded_generators_repeat() {
        let a = RandomOtp::seeded(7);
        let b = RandomOtp::seeded(7);
        let left: Vec<_> = (0..5).map(|_| a.generate()).collect();
        let right: Vec<_> = (0..5).map(|_| b.generate()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn matching_is_exact() {
        assert!(otp_matches("0421", "0421"));
        assert!(!otp_matches("0421", "421"));
        assert!(!otp_matches("0421", "0421 "));
        assert!(!otp_matches("0421", "0422"));
    }
}
