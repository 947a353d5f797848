use crate::Message;
use crate::MqttError;
use futures::channel::mpsc;
use futures::SinkExt;
use futures::StreamExt;

pub trait SubChannel: StreamExt<Item = Message> + Unpin + Send {}

pub trait ErrChannel: StreamExt<Item = MqttError> + Unpin + Send {}

pub trait PubChannel: SinkExt<Message> + Unpin + Send {
    /// Publish a message - unless the pub channel has been closed.
    fn publish(
        &mut self,
        message: Message,
    ) -> impl std::future::Future<Output = Result<(), MqttError>> + Send {
        async move {
            self.send(message)
                .await
                .map_err(|_| MqttError::SendOnClosedConnection)
        }
    }
}

impl SubChannel for mpsc::UnboundedReceiver<Message> {}
impl ErrChannel for mpsc::UnboundedReceiver<MqttError> {}
impl PubChannel for mpsc::UnboundedSender<Message> {}
