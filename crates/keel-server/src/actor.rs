use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, warn};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// An actor that processes messages sequentially from a single mailbox.
/// All state transitions happen in [`Actor::receive`], so the actor state
/// is never subject to concurrent access.
#[async_trait]
pub trait Actor: Sized + Send + 'static {
    type Message: Send + 'static;
    type Options;

    fn name() -> &'static str;

    fn new(options: Self::Options) -> Self;

    /// Runs once before the actor receives the first message.
    async fn start(&mut self, _ctx: &mut ActorContext<Self>) {}

    /// Processes one message and decides how the actor proceeds.
    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: Self::Message) -> ActorAction;

    /// Runs once after the actor has stopped receiving messages.
    async fn stop(self, _ctx: &mut ActorContext<Self>) {}
}

pub enum ActorAction {
    Continue,
    /// Continue after logging a warning for the current message.
    Warn(String),
    /// Stop the actor after logging an error for the current message.
    Fail(String),
    Stop,
}

impl ActorAction {
    pub fn warn(message: impl ToString) -> Self {
        Self::Warn(message.to_string())
    }

    pub fn fail(message: impl ToString) -> Self {
        Self::Fail(message.to_string())
    }
}

pub struct ActorContext<T: Actor> {
    handle: ActorHandle<T>,
    tasks: JoinSet<()>,
}

impl<T: Actor> ActorContext<T> {
    fn new(handle: &ActorHandle<T>) -> Self {
        Self {
            handle: handle.clone(),
            tasks: JoinSet::new(),
        }
    }

    pub fn handle(&self) -> &ActorHandle<T> {
        &self.handle
    }

    /// Sends a message to the actor itself.
    pub fn send(&mut self, message: T::Message) {
        if self.handle.sender.send(message).is_err() {
            warn!("failed to send message to the {} actor", T::name());
        }
    }

    /// Sends a message to the actor itself after a delay.
    pub fn send_with_delay(&mut self, message: T::Message, delay: Duration) {
        let handle = self.handle.clone();
        self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = handle.sender.send(message);
        });
    }

    /// Spawns an auxiliary task owned by the actor.
    /// Tasks still pending when the actor stops are aborted.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tasks.spawn(async move {
            let _ = future.await;
        });
    }

    fn reap(&mut self) {
        while self.tasks.try_join_next().is_some() {}
    }

    async fn close(&mut self) {
        self.tasks.shutdown().await;
    }
}

pub struct ActorHandle<T: Actor> {
    sender: mpsc::UnboundedSender<T::Message>,
}

impl<T: Actor> Clone for ActorHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Actor> ActorHandle<T> {
    pub async fn send(
        &self,
        message: T::Message,
    ) -> Result<(), mpsc::error::SendError<T::Message>> {
        self.sender.send(message)
    }

    /// Waits until the actor has stopped and closed its mailbox.
    pub async fn wait_for_stop(&self) {
        self.sender.closed().await;
    }
}

pub struct ActorSystem {
    tasks: JoinSet<()>,
}

impl ActorSystem {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    /// Spawns a new actor and returns a handle to its mailbox.
    pub fn spawn<T: Actor>(&mut self, options: T::Options) -> ActorHandle<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ActorHandle { sender: tx };
        let actor = T::new(options);
        self.tasks.spawn(Self::run(actor, handle.clone(), rx));
        handle
    }

    async fn run<T: Actor>(
        mut actor: T,
        handle: ActorHandle<T>,
        mut receiver: mpsc::UnboundedReceiver<T::Message>,
    ) {
        let mut ctx = ActorContext::new(&handle);
        actor.start(&mut ctx).await;
        while let Some(message) = receiver.recv().await {
            match actor.receive(&mut ctx, message) {
                ActorAction::Continue => {}
                ActorAction::Warn(message) => {
                    warn!("{}: {message}", T::name());
                }
                ActorAction::Fail(message) => {
                    error!("{}: {message}", T::name());
                    break;
                }
                ActorAction::Stop => break,
            }
            ctx.reap();
        }
        actor.stop(&mut ctx).await;
        ctx.close().await;
        receiver.close();
    }

    /// Waits for all actors in the system to stop.
    pub async fn join(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]
mod tests {
    use tokio::sync::oneshot;

    use super::*;

    struct TestActor;

    enum TestMessage {
        Echo {
            value: String,
            reply: oneshot::Sender<String>,
        },
        Fail,
        Stop,
    }

    #[async_trait]
    impl Actor for TestActor {
        type Message = TestMessage;
        type Options = ();

        fn name() -> &'static str {
            "TestActor"
        }

        fn new(_options: Self::Options) -> Self {
            Self
        }

        fn receive(
            &mut self,
            _ctx: &mut ActorContext<Self>,
            message: Self::Message,
        ) -> ActorAction {
            match message {
                TestMessage::Echo { value, reply } => {
                    let _ = reply.send(value.to_uppercase());
                    ActorAction::Continue
                }
                TestMessage::Fail => ActorAction::fail("the actor is asked to fail"),
                TestMessage::Stop => ActorAction::Stop,
            }
        }
    }

    struct TickActor {
        reply: Option<oneshot::Sender<&'static str>>,
    }

    enum TickMessage {
        Tick,
    }

    #[async_trait]
    impl Actor for TickActor {
        type Message = TickMessage;
        type Options = oneshot::Sender<&'static str>;

        fn name() -> &'static str {
            "TickActor"
        }

        fn new(options: Self::Options) -> Self {
            Self {
                reply: Some(options),
            }
        }

        async fn start(&mut self, ctx: &mut ActorContext<Self>) {
            ctx.send_with_delay(TickMessage::Tick, Duration::from_millis(10));
        }

        fn receive(
            &mut self,
            _ctx: &mut ActorContext<Self>,
            message: Self::Message,
        ) -> ActorAction {
            match message {
                TickMessage::Tick => {
                    if let Some(reply) = self.reply.take() {
                        let _ = reply.send("tick");
                    }
                    ActorAction::Stop
                }
            }
        }
    }

    #[tokio::test]
    async fn test_actor_send() {
        let mut system = ActorSystem::new();
        let handle = system.spawn::<TestActor>(());
        let (tx, rx) = oneshot::channel();
        let result = handle
            .send(TestMessage::Echo {
                value: "hello".to_string(),
                reply: tx,
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(rx.await.unwrap(), "HELLO".to_string());
    }

    #[tokio::test]
    async fn test_actor_wait_for_stop() {
        let mut system = ActorSystem::new();
        let handle = system.spawn::<TestActor>(());
        handle.send(TestMessage::Stop).await.unwrap();
        // Multiple handles should be able to wait for the actor to stop.
        handle.clone().wait_for_stop().await;
        handle.wait_for_stop().await;
        system.join().await;
        assert!(handle.send(TestMessage::Stop).await.is_err());
    }

    #[tokio::test]
    async fn test_actor_fail_stops_actor() {
        let mut system = ActorSystem::new();
        let handle = system.spawn::<TestActor>(());
        handle.send(TestMessage::Fail).await.unwrap();
        handle.wait_for_stop().await;
    }

    #[tokio::test]
    async fn test_actor_delayed_message() {
        let mut system = ActorSystem::new();
        let (tx, rx) = oneshot::channel();
        let _handle = system.spawn::<TickActor>(tx);
        assert_eq!(rx.await.unwrap(), "tick");
        system.join().await;
    }
}
