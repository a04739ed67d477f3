use futures::channel::mpsc::{TrySendError, UnboundedSender};

/// Destination for messages that must not block the sender.
pub trait UnboundedSink<T>: Send + Sync + 'static {
    fn unbounded_send(&self, message: T) -> Result<(), T>;
}

impl<T, S: UnboundedSink<T>> UnboundedSink<T> for Option<S> {
    fn unbounded_send(&self, message: T) -> Result<(), T> {
        match self {
            Some(sink) => sink.unbounded_send(message),
            None => Ok(()),
        }
    }
}

impl<T: Send + 'static> UnboundedSink<T> for UnboundedSender<T> {
    fn unbounded_send(&self, message: T) -> Result<(), T> {
        self.unbounded_send(message)
            .map_err(TrySendError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc;

    use super::*;

    #[test]
    fn none_discards_messages() {
        let sink = None::<UnboundedSender<u8>>;

        assert_eq!(sink.unbounded_send(1), Ok(()));
    }

    #[test]
    fn closed_channel_returns_message() {
        let (tx, rx) = mpsc::unbounded();

        drop(rx);

        assert_eq!(UnboundedSink::unbounded_send(&tx, 7), Err(7));
    }
}
