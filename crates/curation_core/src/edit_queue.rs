use shared::domain::ItemId;

use crate::store::MembershipEdit;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditQueue {
    edits: Vec<MembershipEdit>,
}

impl EditQueue {
    pub fn push(&mut self, edit: MembershipEdit) {
        match &edit {
            MembershipEdit::Reorder(_) => {
                self.edits
                    .retain(|queued| !matches!(queued, MembershipEdit::Reorder(_)));
            }
            MembershipEdit::Add(id) => {
                if self.cancel(|queued| is_remove_of(queued, id)) {
                    return;
                }
            }
            MembershipEdit::Remove(id) => {
                if self.cancel(|queued| is_add_of(queued, id)) {
                    return;
                }
            }
        }
        self.edits.push(edit);
    }

    pub fn take(&mut self) -> Vec<MembershipEdit> {
        std::mem::take(&mut self.edits)
    }

    pub fn clear(&mut self) {
        self.edits.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn as_slice(&self) -> &[MembershipEdit] {
        &self.edits
    }

    fn cancel(&mut self, opposite: impl Fn(&MembershipEdit) -> bool) -> bool {
        match self.edits.iter().rposition(opposite) {
            Some(index) => {
                self.edits.remove(index);
                true
            }
            None => false,
        }
    }
}

fn is_add_of(edit: &MembershipEdit, id: &ItemId) -> bool {
    matches!(edit, MembershipEdit::Add(queued) if queued == id)
}

fn is_remove_of(edit: &MembershipEdit, id: &ItemId) -> bool {
    matches!(edit, MembershipEdit::Remove(queued) if queued == id)
}
