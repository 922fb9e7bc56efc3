use partitura::ChordKind;

/// A chord template: kind + interval set from root (as bitmask over 12 pitch classes).
pub struct ChordTemplate {
    pub kind: ChordKind,
    pub intervals: u16, // bitmask: bit i set means interval i is in the template
    pub size: usize,
}

impl ChordTemplate {
    const fn new(kind: ChordKind, intervals: &[u8]) -> Self {
        let mut mask = 0u16;
        let mut i = 0;
        while i < intervals.len() {
            mask |= 1 << intervals[i];
            i += 1;
        }
        Self {
            kind,
            intervals: mask,
            size: intervals.len(),
        }
    }

    /// Interval of the template's third above the root, if it has one.
    fn third(&self) -> Option<u8> {
        [4u8, 3].into_iter().find(|&i| self.intervals & (1 << i) != 0)
    }
}

/// All recognized chord templates, ordered by specificity (larger first for tiebreaking).
pub static TEMPLATES: &[ChordTemplate] = &[
    // 4-note chords first (more specific)
    ChordTemplate::new(ChordKind::Dominant7, &[0, 4, 7, 10]),
    ChordTemplate::new(ChordKind::Major7, &[0, 4, 7, 11]),
    ChordTemplate::new(ChordKind::Minor7, &[0, 3, 7, 10]),
    ChordTemplate::new(ChordKind::MinorMajor7, &[0, 3, 7, 11]),
    ChordTemplate::new(ChordKind::Diminished7, &[0, 3, 6, 9]),
    ChordTemplate::new(ChordKind::HalfDiminished7, &[0, 3, 6, 10]),
    ChordTemplate::new(ChordKind::Major6, &[0, 4, 7, 9]),
    ChordTemplate::new(ChordKind::Minor6, &[0, 3, 7, 9]),
    ChordTemplate::new(ChordKind::Add9, &[0, 2, 4, 7]),
    // Triads
    ChordTemplate::new(ChordKind::Major, &[0, 4, 7]),
    ChordTemplate::new(ChordKind::Minor, &[0, 3, 7]),
    ChordTemplate::new(ChordKind::Diminished, &[0, 3, 6]),
    ChordTemplate::new(ChordKind::Augmented, &[0, 4, 8]),
    ChordTemplate::new(ChordKind::Suspended4, &[0, 5, 7]),
    ChordTemplate::new(ChordKind::Suspended2, &[0, 2, 7]),
    // Dyad
    ChordTemplate::new(ChordKind::Power, &[0, 7]),
];

/// The four tertian triads considered when a reduction is forced.
const TRIADS: [ChordKind; 4] = [
    ChordKind::Major,
    ChordKind::Minor,
    ChordKind::Diminished,
    ChordKind::Augmented,
];

/// Minimum score for a forced triad reduction to be accepted.
const TRIAD_THRESHOLD: f64 = 0.4;

pub fn template_for(kind: ChordKind) -> Option<&'static ChordTemplate> {
    TEMPLATES.iter().find(|t| t.kind == kind)
}

/// Convert a set of pitch classes to an interval bitmask relative to a root.
fn to_interval_mask(pitch_classes: &[u8], root: u8) -> u16 {
    let mut mask = 0u16;
    for &pc in pitch_classes {
        let interval = (pc % 12 + 12 - root % 12) % 12;
        mask |= 1 << interval;
    }
    mask
}

/// Candidate roots: the bass first, then every other pitch class in the
/// order it was collected, without repeats.
fn candidate_roots(pitch_classes: &[u8], bass: Option<u8>) -> Vec<u8> {
    let mut roots = Vec::with_capacity(pitch_classes.len());
    let present = bass.filter(|b| pitch_classes.iter().any(|pc| pc % 12 == b % 12));
    for pc in present.into_iter().chain(pitch_classes.iter().copied()) {
        let pc = pc % 12;
        if !roots.contains(&pc) {
            roots.push(pc);
        }
    }
    roots
}

/// Spell a simultaneity whose pitch classes match a template exactly.
///
/// Returns `(root_pc, kind)` or `None` when fewer than two distinct pitch
/// classes sound or no template fits without leftovers.
pub fn spell_exact(pitch_classes: &[u8], bass: Option<u8>) -> Option<(u8, ChordKind)> {
    let roots = candidate_roots(pitch_classes, bass);
    if roots.len() < 2 {
        return None;
    }

    for root in roots {
        let intervals = to_interval_mask(pitch_classes, root);
        if let Some(t) = TEMPLATES.iter().find(|t| t.intervals == intervals) {
            return Some((root, t.kind));
        }
    }
    None
}

/// Reduce a pitch collection to its best-fitting triad.
///
/// Scores each present pitch class as a root against the four triads by
/// template coverage, penalizing extra tones and rewarding a bass on the
/// root. Root and third must both sound. Duplicates in `pitch_classes`
/// break ties: the reading that explains more of the sounding notes wins.
pub fn reduce_to_triad(pitch_classes: &[u8], bass: Option<u8>) -> Option<(u8, ChordKind)> {
    let mut best: Option<(u8, ChordKind)> = None;
    let mut best_score = 0.0_f64;
    let mut best_covered = 0usize;

    for root in candidate_roots(pitch_classes, bass) {
        let intervals = to_interval_mask(pitch_classes, root);

        for kind in TRIADS {
            let Some(template) = template_for(kind) else {
                continue;
            };
            let Some(third) = template.third() else {
                continue;
            };
            if intervals & (1 << third) == 0 {
                continue;
            }

            let matched = (intervals & template.intervals).count_ones() as f64;
            let extra = (intervals & !template.intervals).count_ones() as f64;
            let mut score = matched / template.size as f64 - extra * 0.1;

            // Bonus for bass matching root
            if bass.map(|b| b % 12) == Some(root) {
                score += 0.15;
            }

            // Bonus for complete match (all template tones present)
            if intervals & template.intervals == template.intervals {
                score += 0.1;
            }

            let covered = pitch_classes
                .iter()
                .filter(|&&pc| template.intervals & (1 << ((pc % 12 + 12 - root) % 12)) != 0)
                .count();

            if score > best_score || (score == best_score && covered > best_covered) {
                best_score = score;
                best_covered = covered;
                best = Some((root, kind));
            }
        }
    }

    best.filter(|_| best_score > TRIAD_THRESHOLD)
}
