use parking_lot::RwLock;

/// Supplies the current set of reachable peer addresses. The answer may change
/// between calls.
pub trait MembershipSource: Send + Sync {
    fn members(&self) -> Vec<String>;
}

/// Member list that is set from outside, e.g. after the pull servers of a
/// group of nodes have bound their ports.
#[derive(Debug, Default)]
pub struct StaticMembership {
    members: RwLock<Vec<String>>,
}

impl StaticMembership {
    pub fn new(members: Vec<String>) -> Self {
        Self {
            members: RwLock::new(members),
        }
    }

    pub fn set(&self, members: Vec<String>) {
        *self.members.write() = members;
    }

    pub fn add(&self, member: impl Into<String>) {
        self.members.write().push(member.into());
    }
}

impl MembershipSource for StaticMembership {
    fn members(&self) -> Vec<String> {
        self.members.read().clone()
    }
}
