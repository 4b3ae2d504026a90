use super::states::OrderStatus;
use std::collections::{HashMap, HashSet, VecDeque};

/// Allowed outbound transitions for every order status.
///
/// Terminal states are listed with no targets so that a missing entry always
/// means the stored status is unknown to the lifecycle.
const STANDARD_TRANSITIONS: &[(OrderStatus, &[OrderStatus])] = &[
    (
        OrderStatus::Pending,
        &[OrderStatus::InPreparation, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::InPreparation,
        &[OrderStatus::Assigned, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::Assigned,
        &[OrderStatus::InTransit, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::InTransit,
        &[OrderStatus::Delivered, OrderStatus::Returned],
    ),
    (
        OrderStatus::Returned,
        &[OrderStatus::Assigned, OrderStatus::Cancelled],
    ),
    (OrderStatus::Delivered, &[]),
    (OrderStatus::Cancelled, &[]),
];

/// Lookup table from a status to the statuses it may move to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    allowed: HashMap<OrderStatus, Vec<OrderStatus>>,
}

impl TransitionTable {
    /// The delivery lifecycle table
    pub fn standard() -> Self {
        Self::from_entries(
            STANDARD_TRANSITIONS
                .iter()
                .map(|(from, targets)| (*from, targets.to_vec())),
        )
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (OrderStatus, Vec<OrderStatus>)>) -> Self {
        Self {
            allowed: entries.into_iter().collect(),
        }
    }

    /// Targets reachable in one step, or `None` when `from` has no entry
    pub fn allowed_from(&self, from: OrderStatus) -> Option<&[OrderStatus]> {
        self.allowed.get(&from).map(Vec::as_slice)
    }

    pub fn contains(&self, status: OrderStatus) -> bool {
        self.allowed.contains_key(&status)
    }

    pub fn is_allowed(&self, from: OrderStatus, to: OrderStatus) -> bool {
        self.allowed_from(from)
            .is_some_and(|targets| targets.contains(&to))
    }

    /// Shortest sequence of hops from `from` to `to`, excluding `from` itself.
    ///
    /// Returns an empty path when `from == to` and `None` when `to` cannot be
    /// reached.
    pub fn shortest_path(&self, from: OrderStatus, to: OrderStatus) -> Option<Vec<OrderStatus>> {
        if from == to {
            return Some(Vec::new());
        }

        let mut previous: HashMap<OrderStatus, OrderStatus> = HashMap::new();
        let mut visited: HashSet<OrderStatus> = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            for &next in self.allowed_from(current).unwrap_or(&[]) {
                if !visited.insert(next) {
                    continue;
                }
                previous.insert(next, current);
                if next == to {
                    let mut path = vec![to];
                    let mut cursor = to;
                    while let Some(&prior) = previous.get(&cursor) {
                        if prior == from {
                            break;
                        }
                        path.push(prior);
                        cursor = prior;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }

        None
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}
