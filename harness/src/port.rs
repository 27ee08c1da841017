// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Best-effort selection of a free TCP port.
//!
//! A candidate port is drawn uniformly at random from the configured range
//! and accepted if a trial bind succeeds.  Nothing reserves the port: another
//! process can grab it between the probe and actual use.  That race is
//! accepted; callers that cannot tolerate it should pass port 0 to the
//! server and discover the port it actually bound.

use rand::Rng;
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, TcpListener};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("invalid port range: min {min} must be nonzero and at most max {max}")]
    InvalidRange { min: u16, max: u16 },

    #[error("no available port in {range} after {attempts} attempts")]
    Exhausted { range: PortRange, attempts: usize },
}

/// A half-open range `[min, max)` of candidate ports, validated on
/// construction rather than at pick time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortRange {
    min: u16,
    max: u16,
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> Result<PortRange, PortError> {
        if min == 0 || min > max {
            return Err(PortError::InvalidRange { min, max });
        }
        Ok(PortRange { min, max })
    }
}

impl Default for PortRange {
    /// The non-privileged port range.
    fn default() -> PortRange {
        PortRange { min: 1024, max: 65535 }
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.min, self.max)
    }
}

/// Picks a port in `range` that is not in `exclude` and for which a trial
/// bind succeeds at the moment of the check.
///
/// The number of draws is capped at the width of the range, after which
/// [`PortError::Exhausted`] is returned.
pub fn pick_unused_port(
    range: PortRange,
    exclude: &BTreeSet<u16>,
) -> Result<u16, PortError> {
    let mut rng = rand::rng();
    let attempts = usize::from(range.max - range.min);
    for _ in 0..attempts {
        let candidate = rng.random_range(range.min..range.max);
        if exclude.contains(&candidate) {
            continue;
        }
        if port_available(candidate) {
            return Ok(candidate);
        }
    }
    Err(PortError::Exhausted { range, attempts })
}

fn port_available(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_ranges() {
        assert!(matches!(
            PortRange::new(0, 1000),
            Err(PortError::InvalidRange { .. })
        ));
        assert!(matches!(
            PortRange::new(2000, 1000),
            Err(PortError::InvalidRange { .. })
        ));
        assert!(PortRange::new(1024, 65535).is_ok());
        assert!(PortRange::new(1024, 1024).is_ok());
    }

    #[test]
    fn picked_port_is_bindable_and_not_excluded() {
        let range = PortRange::new(20000, 20010).unwrap();
        let exclude = BTreeSet::from([20005]);
        for _ in 0..50 {
            match pick_unused_port(range, &exclude) {
                Ok(port) => {
                    assert_ne!(port, 20005);
                    assert!((20000..20010).contains(&port));
                    assert!(port_available(port));
                }
                // Other processes may legitimately occupy this band.
                Err(PortError::Exhausted { .. }) => (),
                Err(error) => panic!("unexpected error: {}", error),
            }
        }
    }

    #[test]
    fn exhausts_when_nothing_is_available() {
        // Occupy a port ourselves and restrict the range to exactly that
        // port, so every draw must fail the trial bind.
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let range = PortRange::new(port, port + 1).unwrap();
        assert!(matches!(
            pick_unused_port(range, &BTreeSet::new()),
            Err(PortError::Exhausted { .. })
        ));
    }

    #[test]
    fn empty_range_exhausts_immediately() {
        let range = PortRange::new(30000, 30000).unwrap();
        assert!(matches!(
            pick_unused_port(range, &BTreeSet::new()),
            Err(PortError::Exhausted { attempts: 0, .. })
        ));
    }
}
