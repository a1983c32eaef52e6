use bson::oid::ObjectId;

/// A payload paired with the identity that sent it. Operations take the
/// caller from here, never from the payload.
#[derive(Debug, Clone)]
pub struct AuthenticatedRequest<T> {
    pub caller_id: ObjectId,
    pub payload: T,
}

impl<T> AuthenticatedRequest<T> {
    pub fn new(caller_id: ObjectId, payload: T) -> Self {
        Self { caller_id, payload }
    }
}
