//! Greedy CTC decoding.

use crate::decoder::ProbabilityMatrix;
use crate::decoder::alphabet::Alphabet;

/// Most probable class and its probability at every time step
pub fn best_path(probabilities: &ProbabilityMatrix) -> Vec<(usize, f32)> {
    probabilities
        .rows()
        .map(|row| {
            row.iter()
                .copied()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (class, p)| {
                    if p > best.1 { (class, p) } else { best }
                })
        })
        .collect()
}

/// Merge consecutive repeats, then drop blanks
pub fn collapse(classes: &[usize], blank: usize) -> Vec<usize> {
    let mut collapsed = Vec::with_capacity(classes.len());
    let mut previous = None;
    for &class in classes {
        if previous != Some(class) && class != blank {
            collapsed.push(class);
        }
        previous = Some(class);
    }
    collapsed
}

/// Map collapsed classes to text, dropping the unknown placeholder
pub fn to_text(classes: &[usize], alphabet: &Alphabet) -> String {
    classes
        .iter()
        .filter_map(|&class| alphabet.char_for(class))
        .collect()
}

/// Greedy decode of per-step argmax classes into text
pub fn decode_classes(classes: &[usize], alphabet: &Alphabet) -> String {
    to_text(&collapse(classes, alphabet.blank()), alphabet)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alphabet() -> Alphabet {
        // 1 -> x, 2 -> y, 3 -> A, 4 -> z, 5 -> B; blank is 6
        Alphabet::new(vec!['x', 'y', 'A', 'z', 'B']).unwrap()
    }

    #[test]
    fn test_decode_blank_separated_repeats() {
        let alphabet = alphabet();
        let blank = alphabet.blank();
        let classes = [blank, 3, 3, blank, 5, 5, 5, blank];
        assert_eq!(decode_classes(&classes, &alphabet), "AB");
    }

    #[test]
    fn test_blank_between_identical_characters_keeps_both() {
        let alphabet = alphabet();
        let blank = alphabet.blank();
        assert_eq!(decode_classes(&[3, 3, blank, 3], &alphabet), "AA");
        assert_eq!(decode_classes(&[3, 3, 3], &alphabet), "A");
    }

    #[test]
    fn test_collapse_is_idempotent_on_its_output() {
        let blank = 6;
        let inputs: [&[usize]; 4] = [
            &[blank, 3, 3, blank, 5, 5, 5, blank],
            &[1, 1, 2, blank, 4, 4, 4, 1],
            &[blank, blank, blank],
            &[],
        ];
        for input in inputs {
            let once = collapse(input, blank);
            assert_eq!(collapse(&once, blank), once);
        }
    }

    #[test]
    fn test_collapse_fixed_point_on_blank_free_distinct_runs() {
        let blank = 6;
        let sequence = vec![1, 3, 5, 2, 4];
        assert_eq!(collapse(&sequence, blank), sequence);
    }

    #[test]
    fn test_doubled_letters_merge_on_second_pass() {
        // "AA" needs a blank between the two A steps; without it they are one run
        let blank = 6;
        let once = collapse(&[3, blank, 3], blank);
        assert_eq!(once, vec![3, 3]);
        assert_eq!(collapse(&once, blank), vec![3]);
    }

    #[test]
    fn test_unknown_placeholder_is_dropped() {
        let alphabet = alphabet();
        let blank = alphabet.blank();
        assert_eq!(decode_classes(&[0, 0, blank, 1, 0, 2], &alphabet), "xy");
    }

    #[test]
    fn test_all_blank_decodes_to_empty() {
        let alphabet = alphabet();
        let blank = alphabet.blank();
        assert_eq!(decode_classes(&[blank; 12], &alphabet), "");
    }

    #[test]
    fn test_best_path_picks_argmax() {
        let matrix = ProbabilityMatrix::new(
            3,
            3,
            vec![0.1, 0.7, 0.2, 0.5, 0.25, 0.25, 0.0, 0.0, 1.0],
        )
        .unwrap();
        assert_eq!(best_path(&matrix), vec![(1, 0.7), (0, 0.5), (2, 1.0)]);
    }
}
