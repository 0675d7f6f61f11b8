//! Buffer sizing strategies: closed-form formulas deriving a buffer's size
//! from the chain's aggressive/safe duration estimates.

use ccpm_core::{BufferStrategyKind, Task};

/// Size a buffer for the given chain tasks and ratio. `buffer_ratio` is only
/// consumed by [`BufferStrategyKind::CutAndPaste`] and, conditionally, by
/// [`BufferStrategyKind::Adaptive`]; the other strategies derive size purely
/// from the safe/aggressive spread.
pub fn calculate_buffer_size(kind: BufferStrategyKind, tasks: &[&Task], buffer_ratio: f64) -> f64 {
    match kind {
        BufferStrategyKind::CutAndPaste => cut_and_paste(tasks, buffer_ratio),
        BufferStrategyKind::SumOfSquares => sum_of_squares(tasks),
        BufferStrategyKind::RootSquareError => 2.0 * sum_of_squares(tasks),
        BufferStrategyKind::Adaptive => adaptive(tasks, buffer_ratio),
    }
}

fn aggressive_sum(tasks: &[&Task]) -> f64 {
    tasks.iter().map(|t| t.aggressive_duration as f64).sum()
}

/// `buffer_ratio * sum(aggressive durations)`.
fn cut_and_paste(tasks: &[&Task], buffer_ratio: f64) -> f64 {
    aggressive_sum(tasks) * buffer_ratio
}

/// `sqrt(sum((safe - aggressive)^2))`.
fn sum_of_squares(tasks: &[&Task]) -> f64 {
    let squared_diffs: f64 = tasks
        .iter()
        .map(|t| {
            let diff = (t.safe_duration - t.aggressive_duration) as f64;
            diff * diff
        })
        .sum();
    squared_diffs.sqrt()
}

/// Picks Sum-of-Squares when the chain's safe/aggressive ratio varies widely
/// (std dev over 0.3), otherwise Cut-and-Paste; floors the result at 15% of
/// the aggressive chain length either way.
fn adaptive(tasks: &[&Task], buffer_ratio: f64) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }

    let agg_sum = aggressive_sum(tasks);

    let ratios: Vec<f64> = tasks
        .iter()
        .filter(|t| t.aggressive_duration > 0)
        .map(|t| t.safe_duration as f64 / t.aggressive_duration as f64)
        .collect();
    let avg_ratio = if ratios.is_empty() {
        1.5
    } else {
        ratios.iter().sum::<f64>() / ratios.len() as f64
    };
    let variance = if ratios.is_empty() {
        0.0
    } else {
        ratios.iter().map(|r| (r - avg_ratio).powi(2)).sum::<f64>() / ratios.len() as f64
    };
    let std_dev = variance.sqrt();

    let buffer = if std_dev > 0.3 {
        sum_of_squares(tasks)
    } else {
        agg_sum * buffer_ratio
    };

    let min_buffer = agg_sum * 0.15;
    buffer.max(min_buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, aggressive: i64, safe: i64) -> Task {
        Task::new(id, id, aggressive).unwrap().safe_duration(safe).unwrap()
    }

    #[test]
    fn cut_and_paste_scales_aggressive_sum_by_ratio() {
        let t1 = task("a", 4, 6);
        let t2 = task("b", 6, 9);
        let tasks = vec![&t1, &t2];
        assert_eq!(
            calculate_buffer_size(BufferStrategyKind::CutAndPaste, &tasks, 0.5),
            5.0
        );
    }

    #[test]
    fn sum_of_squares_matches_formula() {
        let t1 = task("a", 4, 6);
        let t2 = task("b", 6, 10);
        let tasks = vec![&t1, &t2];
        let expected = ((2.0_f64.powi(2)) + (4.0_f64.powi(2))).sqrt();
        assert!(
            (calculate_buffer_size(BufferStrategyKind::SumOfSquares, &tasks, 0.0) - expected).abs()
                < 1e-9
        );
    }

    #[test]
    fn root_square_error_is_double_sum_of_squares() {
        let t1 = task("a", 4, 6);
        let tasks = vec![&t1];
        let ssq = calculate_buffer_size(BufferStrategyKind::SumOfSquares, &tasks, 0.0);
        let rsem = calculate_buffer_size(BufferStrategyKind::RootSquareError, &tasks, 0.0);
        assert!((rsem - 2.0 * ssq).abs() < 1e-9);
    }

    #[test]
    fn adaptive_floors_at_fifteen_percent_of_aggressive_sum() {
        let t1 = task("a", 10, 10);
        let tasks = vec![&t1];
        assert_eq!(
            calculate_buffer_size(BufferStrategyKind::Adaptive, &tasks, 0.0),
            1.5
        );
    }

    #[test]
    fn adaptive_empty_chain_is_zero() {
        assert_eq!(calculate_buffer_size(BufferStrategyKind::Adaptive, &[], 0.3), 0.0);
    }
}
