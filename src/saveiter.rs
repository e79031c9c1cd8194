//! Which iterations of the reconstruction are written to disk.
//!
//! The schedule string lists iterations to be saved, separated by
//! whitespace or commas. An iteration may be followed by `/interval`, in
//! which case every `interval`-th iteration after it is saved, until the next
//! listed iteration. Before the first listed iteration the default interval
//! applies; with no listed iterations it counts from the first iteration
//! run after `start_iteration`. The last iteration is always saved.
//!
//! `1 3 5 7 10/5 50/10 100/50` saves 1, 3, 5, 7, 10, 15, ... 50, 60, ...
//! 100, 150, ...

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Segment {
    start: usize,
    interval: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveSchedule {
    start_iteration: usize,
    n_iterations: usize,
    segments: Vec<Segment>,
}

impl SaveSchedule {

    pub fn new(default_interval: usize, n_iterations: usize, start_iteration: usize, schedule: &str) -> Result<Self> {
        let listed = parse(schedule)?;
        let origin = if listed.is_empty() { start_iteration } else { 0 };
        let mut segments = vec![Segment { start: origin, interval: default_interval }];
        segments.extend(listed);
        log::debug!("save schedule: {segments:?}");
        Ok(Self { start_iteration, n_iterations, segments })
    }

    pub fn should_save(&self, iteration: usize) -> bool {
        if iteration == self.n_iterations { return true }
        // Listed iterations are taken in order, up to the first one still to come
        let mut current = self.segments[0];
        for &segment in &self.segments[1..] {
            if segment.start > iteration { break }
            current = segment;
        }
        if iteration < current.start { return false }
        if iteration == current.start { return true }
        if current.interval == 0 { return false }
        (iteration - current.start) % current.interval == 0
    }

    /// All iterations which will be run and saved, in order
    pub fn saved(&self) -> impl Iterator<Item = usize> + '_ {
        (self.start_iteration + 1..=self.n_iterations).filter(|&i| self.should_save(i))
    }
}

fn is_separator(c: char) -> bool { c == ' ' || c == '\t' || c == ',' }

fn parse(schedule: &str) -> Result<Vec<Segment>> {
    let syntax = |message: String| Error::Syntax(format!("save_iterations `{schedule}`: {message}"));
    let mut segments = vec![];
    let mut rest = schedule.trim_start_matches(is_separator);
    while !rest.is_empty() {
        let (start, after) = leading_number(rest)
            .ok_or_else(|| syntax(format!("missing iteration number at `{rest}`")))?;
        rest = after.trim_start_matches(is_separator);
        let interval = match rest.strip_prefix('/') {
            Some(after_slash) => {
                let after_slash = after_slash.trim_start_matches(is_separator);
                let (interval, after) = leading_number(after_slash)
                    .ok_or_else(|| syntax(format!("missing interval after iteration {start}")))?;
                rest = after.trim_start_matches(is_separator);
                interval
            }
            None => {
                if let Some(c) = rest.chars().next().filter(|c| !c.is_ascii_digit()) {
                    return Err(syntax(format!("unexpected character `{c}`")));
                }
                0
            }
        };
        segments.push(Segment { start, interval });
    }
    Ok(segments)
}

fn leading_number(s: &str) -> Option<(usize, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 { return None }
    s[..end].parse().ok().map(|n| (n, &s[end..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn saved(default_interval: usize, n_iterations: usize, schedule: &str) -> Vec<usize> {
        resumed(default_interval, n_iterations, 0, schedule)
    }

    fn resumed(default_interval: usize, n_iterations: usize, start_iteration: usize, schedule: &str) -> Vec<usize> {
        SaveSchedule::new(default_interval, n_iterations, start_iteration, schedule).unwrap().saved().collect()
    }

    #[rstest(/**/ default_interval, n_iterations, expected,
             case(1, 5, vec![1, 2, 3, 4, 5]),
             case(2, 5, vec![2, 4, 5]),
             case(3, 7, vec![3, 6, 7]),
             case(0, 5, vec![5]),
    )]
    fn default_interval_without_schedule(default_interval: usize, n_iterations: usize, expected: Vec<usize>) {
        assert_eq!(saved(default_interval, n_iterations, ""), expected);
    }

    #[test]
    fn listed_iterations_and_intervals() {
        let expected = vec![1, 3, 5, 7, 10, 15, 20, 25, 30, 35, 40, 45, 50, 60, 70, 80, 90, 100, 150, 160];
        assert_eq!(saved(1, 160, "1 3 5 7 10/5 50/10 100/50"), expected);
    }

    #[test]
    fn default_interval_applies_before_first_listed_iteration() {
        let mut expected: Vec<usize> = (2..=10).collect();
        expected.extend([15, 20]);
        assert_eq!(saved(3, 20, "2/1, 10/5"), expected);
        assert_eq!(saved(2, 9, "\t5 , 7"), vec![2, 4, 5, 7, 9]);
    }

    #[rstest(/**/ default_interval, n_iterations, start_iteration, schedule, expected,
             case(2, 10, 3, "",    vec![5, 7, 9, 10]),
             case(3, 10, 4, " , ", vec![7, 10]),
             case(2, 10, 3, "6",   vec![4, 6, 10]),
    )]
    fn resumed_runs_count_the_default_interval_from_the_start_iteration(
        default_interval: usize, n_iterations: usize, start_iteration: usize, schedule: &str, expected: Vec<usize>,
    ) {
        assert_eq!(resumed(default_interval, n_iterations, start_iteration, schedule), expected);
    }

    #[test]
    fn spaces_around_the_slash_are_allowed() {
        assert_eq!(saved(0, 12, "4 / 4"), vec![4, 8, 12]);
    }

    #[rstest(/**/ schedule,
             case("x"),
             case("3x"),
             case("4/"),
             case("/2"),
             case("3/a"),
             case("1 2; 3"),
    )]
    fn malformed_schedules_are_syntax_errors(schedule: &str) {
        assert!(matches!(SaveSchedule::new(1, 10, 0, schedule), Err(Error::Syntax(_))));
    }
}
