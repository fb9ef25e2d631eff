/// What the delivery pipeline should do with the inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Deliver the message unchanged. Every non-actioned path returns
    /// this explicitly.
    Accept,
    /// The scheduling change was fully actioned; suppress delivery.
    Discard,
    /// Refuse the message. Reserved; no current handler returns it.
    Reject,
}
