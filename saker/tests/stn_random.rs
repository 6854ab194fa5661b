//! Seeded random workouts for the temporal network: whatever sequence of
//! additions is thrown at it, a committed network is consistent and a
//! rejected addition changes nothing.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use saker::{Bound, Stn, Timepoint, Window};

fn random_window(rng: &mut StdRng) -> Window {
    let lo = rng.random_range(-20..=20);
    let width = rng.random_range(0..=30);
    Window::between(lo, lo + width)
}

#[test]
fn every_committed_addition_leaves_the_network_consistent() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..20 {
        let mut stn = Stn::new();
        let points: Vec<Timepoint> = (0..5).map(|_| stn.add_timepoint()).collect();
        let mut accepted = 0;
        for _ in 0..40 {
            let u = points[rng.random_range(0..points.len())];
            let v = points[rng.random_range(0..points.len())];
            if u == v {
                continue;
            }
            let before = stn.clone();
            match stn.add_constraint(u, v, random_window(&mut rng)) {
                Ok(_) => {
                    accepted += 1;
                    assert!(stn.consistent());
                }
                Err(_) => {
                    // Atomicity: the failed addition left every window
                    // exactly as it was.
                    for a in before.timepoints() {
                        for b in before.timepoints() {
                            assert_eq!(stn.window(a, b), before.window(a, b));
                        }
                    }
                }
            }
        }
        assert!(accepted > 0, "the workload should commit something");
    }
}

#[test]
fn solved_bounds_respect_every_pair_window() {
    let mut rng = StdRng::seed_from_u64(0xbeef);
    let mut stn = Stn::new();
    let points: Vec<Timepoint> = (0..5).map(|_| stn.add_timepoint()).collect();
    for point in &points {
        let _ = stn.add_constraint(Stn::ORIGIN, *point, Window::between(0, 100));
    }
    for _ in 0..30 {
        let u = points[rng.random_range(0..points.len())];
        let v = points[rng.random_range(0..points.len())];
        if u == v {
            continue;
        }
        let _ = stn.add_constraint(u, v, random_window(&mut rng));
    }
    stn.solve().expect("a committed network stays consistent");

    for u in stn.timepoints() {
        for v in stn.timepoints() {
            let (Bound::Finite(earliest_v), Bound::Finite(latest_u)) =
                (stn.earliest(v), stn.latest(u))
            else {
                continue;
            };
            let Bound::Finite(upper) = stn.window(u, v).hi else {
                continue;
            };
            assert!(
                earliest_v - latest_u <= upper,
                "bounds of {u}..{v} violate the pair window"
            );
        }
    }
}
