// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pure planner: decides the next iteration from the previous descriptor and
//! the current chain head. Returns `None` when there is nothing to scan yet.

use crate::types::{Iteration, IterationState};

#[derive(Clone, Copy, Debug)]
pub struct PlannerConfig {
    pub starting_block: u64,
    pub confirmation_blocks: u64,
    pub max_blocks_batch_size: u64,
}

/// First match wins:
///
/// 1. no previous iteration: cold start, enter recovery before the very
///    first block of interest;
/// 2. previous left `Started`: the process died mid-pass, re-enter recovery
///    from the block before the aborted range so nothing is skipped;
/// 3. a completed recovery round that reached its capture point ends the
///    recovery;
/// 4. otherwise scan forward from the previous cursor, bounded by the
///    confirmed head and the batch cap; an empty range is a skip;
/// 5. while recovering, keep recovering and preserve the capture point taken
///    on the first round;
/// 6. otherwise a plain forward pass.
pub fn plan(previous: Option<&Iteration>, head: u64, config: &PlannerConfig) -> Option<Iteration> {
    let Some(previous) = previous else {
        return Some(Iteration::RecoveryStart {
            state: IterationState::Started,
            to_block: config.starting_block.saturating_sub(1),
        });
    };

    if previous.is_started() {
        let to_block = match previous.from_block() {
            Some(from_block) => from_block.saturating_sub(1),
            None => previous.to_block(),
        };
        return Some(Iteration::RecoveryStart {
            state: IterationState::Started,
            to_block,
        });
    }

    if let Iteration::Recovery {
        to_block,
        recovery_until_block,
        ..
    } = previous
    {
        if to_block >= recovery_until_block {
            return Some(Iteration::RecoveryEnd {
                state: IterationState::Started,
                to_block: *to_block,
            });
        }
    }

    let confirmed_head = head.saturating_sub(config.confirmation_blocks);
    let from_block = previous.to_block() + 1;
    let to_block = confirmed_head.min(from_block + config.max_blocks_batch_size);
    if to_block.saturating_sub(from_block) < 1 {
        return None;
    }

    match previous {
        Iteration::Recovery {
            recovery_until_block,
            ..
        } => Some(Iteration::Recovery {
            state: IterationState::Started,
            from_block,
            to_block,
            recovery_until_block: *recovery_until_block,
        }),
        Iteration::RecoveryStart { .. } => Some(Iteration::Recovery {
            state: IterationState::Started,
            from_block,
            to_block,
            // Captured once, on the first recovery round
            recovery_until_block: head,
        }),
        _ => Some(Iteration::Normal {
            state: IterationState::Started,
            from_block,
            to_block,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: PlannerConfig = PlannerConfig {
        starting_block: 1000,
        confirmation_blocks: 20,
        max_blocks_batch_size: 1000,
    };

    fn started(it: Iteration) -> Iteration {
        match it.state() {
            IterationState::Started => it,
            _ => panic!("expected started"),
        }
    }

    #[test]
    fn test_cold_start_enters_recovery() {
        let next = plan(None, 5000, &CONFIG).unwrap();
        assert_eq!(
            next,
            Iteration::RecoveryStart {
                state: IterationState::Started,
                to_block: 999
            }
        );
    }

    #[test]
    fn test_cold_start_then_first_recovery_round() {
        let head = CONFIG.starting_block + 2 * CONFIG.confirmation_blocks;

        let first = started(plan(None, head, &CONFIG).unwrap());
        assert_eq!(
            first,
            Iteration::RecoveryStart {
                state: IterationState::Started,
                to_block: CONFIG.starting_block - 1
            }
        );

        let second = plan(Some(&first.completed()), head, &CONFIG).unwrap();
        assert_eq!(
            second,
            Iteration::Recovery {
                state: IterationState::Started,
                from_block: CONFIG.starting_block,
                to_block: head - CONFIG.confirmation_blocks,
                recovery_until_block: head,
            }
        );
    }

    #[test]
    fn test_happy_path_normal_progression() {
        let previous = Iteration::Normal {
            state: IterationState::Completed,
            from_block: 5,
            to_block: 10,
        };
        let next = plan(Some(&previous), 200, &CONFIG).unwrap();
        assert_eq!(
            next,
            Iteration::Normal {
                state: IterationState::Started,
                from_block: 11,
                to_block: 180,
            }
        );
    }

    #[test]
    fn test_crash_mid_iteration_reenters_before_range() {
        let previous = Iteration::Normal {
            state: IterationState::Started,
            from_block: 100,
            to_block: 150,
        };
        let next = plan(Some(&previous), 500, &CONFIG).unwrap();
        assert_eq!(
            next,
            Iteration::RecoveryStart {
                state: IterationState::Started,
                to_block: 99
            }
        );
    }

    #[test]
    fn test_crash_during_marker_reuses_its_cursor() {
        // A started marker has no range; the safe point is its own toBlock
        let previous = Iteration::RecoveryStart {
            state: IterationState::Started,
            to_block: 42,
        };
        let next = plan(Some(&previous), 500, &CONFIG).unwrap();
        assert_eq!(
            next,
            Iteration::RecoveryStart {
                state: IterationState::Started,
                to_block: 42
            }
        );
    }

    #[test]
    fn test_recovery_window_scanned_ends_recovery() {
        let previous = Iteration::Recovery {
            state: IterationState::Completed,
            from_block: 5,
            to_block: 10,
            recovery_until_block: 8,
        };
        let next = plan(Some(&previous), 500, &CONFIG).unwrap();
        assert_eq!(
            next,
            Iteration::RecoveryEnd {
                state: IterationState::Started,
                to_block: 10
            }
        );
    }

    #[test]
    fn test_recovery_preserves_until_block_across_rounds() {
        let previous = Iteration::Recovery {
            state: IterationState::Completed,
            from_block: 1000,
            to_block: 2000,
            recovery_until_block: 9000,
        };
        let next = plan(Some(&previous), 9500, &CONFIG).unwrap();
        assert_eq!(
            next,
            Iteration::Recovery {
                state: IterationState::Started,
                from_block: 2001,
                to_block: 3001,
                recovery_until_block: 9000,
            }
        );
    }

    #[test]
    fn test_recovery_end_resumes_normal() {
        let previous = Iteration::RecoveryEnd {
            state: IterationState::Completed,
            to_block: 10,
        };
        let next = plan(Some(&previous), 200, &CONFIG).unwrap();
        assert_eq!(
            next,
            Iteration::Normal {
                state: IterationState::Started,
                from_block: 11,
                to_block: 180,
            }
        );
    }

    #[test]
    fn test_skip_until_enough_confirmed_blocks() {
        // Head one short of giving the starting block a confirmed successor
        let head = CONFIG.starting_block + CONFIG.confirmation_blocks - 1;
        let first = started(plan(None, head, &CONFIG).unwrap());
        assert!(plan(Some(&first.completed()), head, &CONFIG).is_none());

        // A single confirmed block is still an empty range
        let head = CONFIG.starting_block + CONFIG.confirmation_blocks;
        assert!(plan(Some(&first.completed()), head, &CONFIG).is_none());
    }

    #[test]
    fn test_confirmed_head_behind_cursor_skips() {
        let previous = Iteration::Normal {
            state: IterationState::Completed,
            from_block: 100,
            to_block: 180,
        };
        assert!(plan(Some(&previous), 185, &CONFIG).is_none());
    }

    #[test]
    fn test_batch_size_clamps_range() {
        let previous = Iteration::Normal {
            state: IterationState::Completed,
            from_block: 1,
            to_block: 10,
        };
        let next = plan(Some(&previous), 1_000_000, &CONFIG).unwrap();
        assert_eq!(
            next,
            Iteration::Normal {
                state: IterationState::Started,
                from_block: 11,
                to_block: 11 + CONFIG.max_blocks_batch_size,
            }
        );
    }

    #[test]
    fn test_planner_is_deterministic() {
        let previous = Iteration::Recovery {
            state: IterationState::Completed,
            from_block: 5,
            to_block: 10,
            recovery_until_block: 500,
        };
        let a = plan(Some(&previous), 700, &CONFIG);
        let b = plan(Some(&previous), 700, &CONFIG);
        assert_eq!(a, b);
    }
}
