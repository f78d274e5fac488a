//! Host metrics reported by `/system/status`.

/// 1, 5 and 15 minute load averages, or `None` where unavailable.
pub fn load_average() -> Option<[f64; 3]> {
    #[cfg(unix)]
    {
        let mut loads = [0.0_f64; 3];
        // Safety: the buffer holds exactly the 3 samples requested.
        let n = unsafe { libc::getloadavg(loads.as_mut_ptr(), 3) };
        if n == 3 {
            return Some(loads);
        }
        None
    }

    #[cfg(not(unix))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_reports_non_negative_load() {
        let loads = load_average().expect("getloadavg is available on Linux");
        assert!(loads.iter().all(|l| *l >= 0.0));
    }
}
