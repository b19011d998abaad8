//! Channels and task spawn
//!
//! Channels are flume pairs behind a close-once wrapper: `close` drops the
//! sender, after which receives drain the buffer and then report
//! not-ok. Tasks spawned by `go` run detached on their own OS threads;
//! a task that faults reports into a process-wide stream the host drains
//! with `task_faults`.

use std::sync::{Arc, Mutex};
use std::thread;

use once_cell::sync::Lazy;

use crate::error::{EvalResult, Fault};
use crate::runtime::value::Value;
use crate::span::Span;

/// Script recursion happens on these threads too, so they get the same
/// stack headroom as the interpreter's main thread.
const TASK_STACK_SIZE: usize = 8 * 1024 * 1024;

struct Channel {
    sender: Mutex<Option<flume::Sender<Value>>>,
    receiver: flume::Receiver<Value>,
}

/// A cloneable channel handle. Capacity 0 is a rendezvous channel: send
/// blocks until a receiver takes the value.
#[derive(Clone)]
pub struct ChanRef(Arc<Channel>);

impl ChanRef {
    pub fn new(capacity: usize) -> ChanRef {
        let (tx, rx) = flume::bounded(capacity);
        ChanRef(Arc::new(Channel {
            sender: Mutex::new(Some(tx)),
            receiver: rx,
        }))
    }

    /// Blocking send. A send that raced ahead of `close` may still
    /// complete; one that observes the closed state faults.
    pub fn send(&self, value: Value, span: Span) -> EvalResult<()> {
        let sender = self.0.sender.lock().unwrap().clone();
        match sender {
            Some(tx) => tx
                .send(value)
                .map_err(|_| Fault::channel("send on closed channel", span)),
            None => Err(Fault::channel("send on closed channel", span)),
        }
    }

    /// Blocking receive. Returns `(value, true)` while the channel has
    /// senders or buffered values, then `(nil, false)` once closed and
    /// drained.
    pub fn recv(&self) -> (Value, bool) {
        match self.0.receiver.recv() {
            Ok(value) => (value, true),
            Err(_) => (Value::Nil, false),
        }
    }

    pub fn close(&self, span: Span) -> EvalResult<()> {
        match self.0.sender.lock().unwrap().take() {
            Some(_) => Ok(()),
            None => Err(Fault::channel("close of closed channel", span)),
        }
    }

    pub fn same_channel(&self, other: &ChanRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

static TASK_FAULTS: Lazy<(flume::Sender<Fault>, flume::Receiver<Fault>)> =
    Lazy::new(flume::unbounded);

pub fn report_task_fault(fault: Fault) {
    let _ = TASK_FAULTS.0.send(fault);
}

/// Drains every task fault reported so far.
pub fn task_faults() -> Vec<Fault> {
    TASK_FAULTS.1.try_iter().collect()
}

/// Runs `task` detached; a faulting task reports to the fault stream
/// instead of crashing anything.
pub fn spawn_task(task: impl FnOnce() -> EvalResult<Value> + Send + 'static) {
    let spawned = thread::Builder::new()
        .name("kesh-task".to_string())
        .stack_size(TASK_STACK_SIZE)
        .spawn(move || {
            if let Err(fault) = task() {
                report_task_fault(fault);
            }
        });
    if let Err(err) = spawned {
        report_task_fault(Fault::flow(
            format!("couldn't spawn task: {}", err),
            Span::default(),
        ));
    }
}

/// Polls the fault stream for a fault mentioning `marker`, re-queueing
/// faults that belong to other tests.
#[cfg(test)]
pub fn wait_for_task_fault(marker: &str) -> bool {
    for _ in 0..200 {
        for fault in task_faults() {
            let in_payload = matches!(&fault.payload, Some(Value::Str(s)) if s.contains(marker));
            if fault.message.contains(marker) || in_payload {
                return true;
            }
            report_task_fault(fault);
        }
        thread::sleep(std::time::Duration::from_millis(10));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;

    #[test]
    fn test_buffered_send_recv() {
        let chan = ChanRef::new(2);
        chan.send(Value::Int(1), Span::default()).unwrap();
        chan.send(Value::Int(2), Span::default()).unwrap();
        let (first, ok) = chan.recv();
        assert!(ok);
        assert_eq!(first.to_string(), "1");
        let (second, ok) = chan.recv();
        assert!(ok);
        assert_eq!(second.to_string(), "2");
    }

    #[test]
    fn test_rendezvous() {
        let chan = ChanRef::new(0);
        let sender = chan.clone();
        let handle = thread::spawn(move || sender.send(Value::Int(7), Span::default()));
        let (value, ok) = chan.recv();
        assert!(ok);
        assert_eq!(value.to_string(), "7");
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_close_drains_then_not_ok() {
        let chan = ChanRef::new(2);
        chan.send(Value::Int(1), Span::default()).unwrap();
        chan.send(Value::Int(2), Span::default()).unwrap();
        chan.close(Span::default()).unwrap();

        let (first, ok) = chan.recv();
        assert!(ok);
        assert_eq!(first.to_string(), "1");
        let (second, ok) = chan.recv();
        assert!(ok);
        assert_eq!(second.to_string(), "2");
        let (empty, ok) = chan.recv();
        assert!(!ok);
        assert!(empty.is_nil());
    }

    #[test]
    fn test_send_on_closed_faults() {
        let chan = ChanRef::new(1);
        chan.close(Span::default()).unwrap();
        let err = chan.send(Value::Int(1), Span::default()).unwrap_err();
        assert!(matches!(err.kind, FaultKind::Channel));
    }

    #[test]
    fn test_double_close_faults() {
        let chan = ChanRef::new(1);
        chan.close(Span::default()).unwrap();
        let err = chan.close(Span::default()).unwrap_err();
        assert!(matches!(err.kind, FaultKind::Channel));
        assert!(err.message.contains("close of closed"));
    }

    #[test]
    fn test_task_fault_stream() {
        spawn_task(|| {
            Err(Fault::coerce(
                "task fault stream unit marker",
                Span::default(),
            ))
        });
        assert!(wait_for_task_fault("task fault stream unit marker"));
    }

    #[test]
    fn test_clone_shares_channel() {
        let chan = ChanRef::new(1);
        let alias = chan.clone();
        assert!(chan.same_channel(&alias));
        chan.send(Value::Int(5), Span::default()).unwrap();
        let (value, ok) = alias.recv();
        assert!(ok);
        assert_eq!(value.to_string(), "5");
    }
}
