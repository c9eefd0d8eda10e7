// event.rs: Event bus and the consumer that feeds it into the state machine

use crate::machine::MachineError;
use crate::state::{Input, InputType, State};
use crate::transitions::{Effects, PlaybackMachine};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Bus capacity. Publishers block when it is full.
pub const EVENT_BUS_CAPACITY: usize = 1;

pub fn event_bus() -> (mpsc::Sender<Input>, mpsc::Receiver<Input>) {
    mpsc::channel(EVENT_BUS_CAPACITY)
}

/// Feeds one input through the machine, logging rejections.
pub fn process_event(
    machine: &mut PlaybackMachine,
    fx: &mut Effects,
    input: &Input,
) -> Result<State, MachineError<State, InputType>> {
    let from = machine.current();
    match machine.consume(input, fx) {
        Ok(to) => {
            tracing::debug!(?from, ?to, kind = ?input.kind, song = %input.payload, "state changed");
            Ok(to)
        }
        Err(e) => {
            tracing::info!(error = %e, song = %input.payload, "ignoring input");
            Err(e)
        }
    }
}

/// Drains the bus into the machine until shutdown or until every publisher is gone.
///
/// Inputs are handled strictly in arrival order. Rejected inputs are reported
/// and skipped. On exit the timer is stopped and the bus closed. The machine
/// is handed back for inspection.
pub async fn consume_events(
    mut machine: PlaybackMachine,
    mut fx: Effects,
    mut bus: mpsc::Receiver<Input>,
    shutdown: CancellationToken,
) -> PlaybackMachine {
    loop {
        let input = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            input = bus.recv() => match input {
                Some(input) => input,
                None => break,
            },
        };
        let _ = process_event(&mut machine, &mut fx, &input);
    }
    fx.timer.stop();
    bus.close();
    tracing::debug!(state = ?machine.current(), "event consumer stopped");
    machine
}
