use shared::domain::ItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Up,
    Down,
}

/// Removes the element at `from` and reinserts it at `to`. Out-of-range indices leave the
/// order unchanged.
pub fn move_index(ids: &[ItemId], from: usize, to: usize) -> Vec<ItemId> {
    let mut next = ids.to_vec();
    if from >= next.len() || to >= next.len() || from == to {
        return next;
    }
    let moved = next.remove(from);
    next.insert(to, moved);
    next
}

/// New order for dropping `dragged` onto `dropped_on`, or `None` when either id is not a
/// member or the gesture changes nothing.
pub fn drag_reorder(ids: &[ItemId], dragged: &ItemId, dropped_on: &ItemId) -> Option<Vec<ItemId>> {
    let from = ids.iter().position(|id| id == dragged)?;
    let to = ids.iter().position(|id| id == dropped_on)?;
    (from != to).then(|| move_index(ids, from, to))
}

/// Keyboard move by one slot. Goes through the same list move as a drag.
pub fn step_reorder(ids: &[ItemId], id: &ItemId, step: Step) -> Option<Vec<ItemId>> {
    let from = ids.iter().position(|member| member == id)?;
    let to = match step {
        Step::Up => from.checked_sub(1)?,
        Step::Down => Some(from + 1).filter(|to| *to < ids.len())?,
    };
    drag_reorder(ids, id, &ids[to])
}
