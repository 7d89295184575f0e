use campusops_auth::Actor;

/// The resolved caller of a request.
///
/// Inserted by the auth middleware; every protected route can rely on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor: Actor,
}

impl ActorContext {
    pub fn new(actor: Actor) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }
}
