use partitura::{Event, EventKind, PitchName, Score, Step};
use tracing::debug;

use crate::types::{Key, KeyMode};

/// Krumhansl-Kessler major key profile (duration-weighted perception studies).
const MAJOR_PROFILE: [f64; 12] = [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];

/// Krumhansl-Kessler minor key profile.
const MINOR_PROFILE: [f64; 12] = [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

/// Weight of a grace note, in quarter lengths.
const GRACE_WEIGHT: f64 = 0.25;

/// Conventional tonic spelling for major keys, by pitch class.
const MAJOR_TONICS: [(Step, i8); 12] = [
    (Step::C, 0),
    (Step::D, -1),
    (Step::D, 0),
    (Step::E, -1),
    (Step::E, 0),
    (Step::F, 0),
    (Step::G, -1),
    (Step::G, 0),
    (Step::A, -1),
    (Step::A, 0),
    (Step::B, -1),
    (Step::B, 0),
];

/// Conventional tonic spelling for minor keys, by pitch class.
const MINOR_TONICS: [(Step, i8); 12] = [
    (Step::C, 0),
    (Step::C, 1),
    (Step::D, 0),
    (Step::E, -1),
    (Step::E, 0),
    (Step::F, 0),
    (Step::F, 1),
    (Step::G, 0),
    (Step::G, 1),
    (Step::A, 0),
    (Step::B, -1),
    (Step::B, 0),
];

/// Estimate the global key of a score using the Krumhansl-Schmuckler algorithm.
///
/// Builds a duration-weighted pitch-class histogram over every note and chord
/// of every part and correlates it against all 24 major/minor key profiles.
/// Returns `None` when the score has no pitches or nothing correlates
/// positively; callers treat that as "no key", not as a failure.
pub fn estimate_key(score: &Score) -> Option<Key> {
    let histogram = pitch_class_histogram(score.parts.iter().flat_map(|p| p.events()));

    let total: f64 = histogram.iter().sum();
    if total <= 0.0 {
        debug!("no pitched material for key estimation");
        return None;
    }

    let mut best: Option<(u8, KeyMode, f64)> = None;
    for root in 0..12u8 {
        // Rotate histogram so root = index 0
        let mut rotated = [0.0; 12];
        for (i, slot) in rotated.iter_mut().enumerate() {
            *slot = histogram[(i + root as usize) % 12];
        }

        for (mode, profile) in [(KeyMode::Major, &MAJOR_PROFILE), (KeyMode::Minor, &MINOR_PROFILE)] {
            let corr = pearson(&rotated, profile);
            if best.map_or(true, |(_, _, b)| corr > b) {
                best = Some((root, mode, corr));
            }
        }
    }

    let (root, mode, correlation) = best?;
    if correlation <= 0.0 {
        debug!(correlation, "no key profile correlates positively");
        return None;
    }

    Some(Key {
        tonic: tonic_name(root, mode),
        mode,
        correlation: (correlation * 10000.0).round() / 10000.0,
    })
}

fn pitch_class_histogram<'a>(events: impl Iterator<Item = &'a Event>) -> [f64; 12] {
    let mut histogram = [0.0_f64; 12];
    for event in events {
        let weight = if event.grace {
            GRACE_WEIGHT
        } else {
            event.duration.max(0.0)
        };
        match &event.kind {
            EventKind::Note(Some(pitch)) => histogram[pitch.pitch_class() as usize] += weight,
            EventKind::Chord(pitches) => {
                for pitch in pitches {
                    histogram[pitch.pitch_class() as usize] += weight;
                }
            }
            _ => {}
        }
    }
    histogram
}

fn tonic_name(pitch_class: u8, mode: KeyMode) -> PitchName {
    let table = match mode {
        KeyMode::Major => &MAJOR_TONICS,
        KeyMode::Minor => &MINOR_TONICS,
    };
    let (step, alter) = table[(pitch_class % 12) as usize];
    PitchName::new(step, alter)
}

/// Pearson correlation coefficient between two 12-element arrays.
fn pearson(x: &[f64; 12], y: &[f64; 12]) -> f64 {
    let x_mean: f64 = x.iter().sum::<f64>() / 12.0;
    let y_mean: f64 = y.iter().sum::<f64>() / 12.0;

    let mut num = 0.0;
    let mut x_sq = 0.0;
    let mut y_sq = 0.0;

    for i in 0..12 {
        let xd = x[i] - x_mean;
        let yd = y[i] - y_mean;
        num += xd * yd;
        x_sq += xd * xd;
        y_sq += yd * yd;
    }

    let denom = (x_sq * y_sq).sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    num / denom
}
