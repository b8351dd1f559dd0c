//! Gap-limit address discovery
//!
//! The scanner owns the deposit and change address chains of one wallet:
//! a slot table per chain, the used-index frontier, and the watched window
//! of live subscriptions. All slot mutation happens on a single event loop
//! that drains status deliveries and watch/extend/stop commands from one
//! queue, so the self-triggered extension pass is ordinary sequential code
//! rather than a re-entrant callback.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::WalletError;
use crate::provider::{AddressStatus, NetworkProvider, StatusUpdate, SubscriptionId, TxRef, Utxo};
use crate::storage::AddressStore;
use crate::wallet::balance::{self, Balance};

/// Which address chain a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Deposit,
    Change,
}

impl Chain {
    pub const ALL: [Chain; 2] = [Chain::Deposit, Chain::Change];

    pub fn is_change(self) -> bool {
        matches!(self, Chain::Change)
    }

    fn pos(self) -> usize {
        match self {
            Chain::Deposit => 0,
            Chain::Change => 1,
        }
    }
}

/// One derivation index under watch.
#[derive(Debug, Clone)]
pub struct AddressSlot {
    pub index: u32,
    pub chain: Chain,
    pub address: String,
    pub token_address: Option<String>,
    pub status: AddressStatus,
    pub utxos: Vec<Utxo>,
    pub raw_history: Vec<TxRef>,
}

/// Resolved address handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressInfo {
    pub chain: Chain,
    pub index: u32,
    pub address: String,
    pub token_address: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Frontier {
    used_index: u32,
    deliveries: u64,
}

struct ChainState {
    used_index: u32,
    slots: Vec<AddressSlot>,
}

impl ChainState {
    fn watched_count(&self) -> u32 {
        self.slots.len() as u32
    }
}

struct ScannerState {
    chains: [ChainState; 2],
    /// Subscription dispatch table, owned by this scanner instance
    by_address: HashMap<String, (Chain, u32)>,
    subscriptions: HashMap<String, SubscriptionId>,
    /// Addresses subscribed but not yet heard from
    pending_first: HashSet<String>,
    stopped: bool,
}

struct Barrier {
    pending: HashSet<String>,
    done: oneshot::Sender<Result<(), WalletError>>,
}

enum Command {
    Watch {
        done: oneshot::Sender<Result<(), WalletError>>,
    },
    ScanMore {
        extra: u32,
        done: oneshot::Sender<Result<(), WalletError>>,
    },
    Stop {
        done: oneshot::Sender<Result<(), WalletError>>,
    },
}

struct Shared {
    provider: Arc<dyn NetworkProvider>,
    store: Arc<dyn AddressStore>,
    gap_limit: u32,
    idle_timeout: Duration,
    state: Mutex<ScannerState>,
    frontier_tx: [watch::Sender<Frontier>; 2],
    status_tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ScannerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Discovers and watches the used portion of both address chains.
pub struct GapLimitScanner {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl GapLimitScanner {
    /// Create a scanner. `seed_deposit`/`seed_change` pre-position the
    /// frontier (restored wallets resume discovery from their serialized
    /// indices, never from zero). Must be called inside a tokio runtime.
    pub fn new(
        provider: Arc<dyn NetworkProvider>,
        store: Arc<dyn AddressStore>,
        gap_limit: u32,
        idle_timeout: Duration,
        seed_deposit: u32,
        seed_change: u32,
    ) -> Self {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let frontier_tx = [
            watch::channel(Frontier {
                used_index: seed_deposit,
                deliveries: 0,
            })
            .0,
            watch::channel(Frontier {
                used_index: seed_change,
                deliveries: 0,
            })
            .0,
        ];

        let shared = Arc::new(Shared {
            provider,
            store,
            gap_limit,
            idle_timeout,
            state: Mutex::new(ScannerState {
                chains: [
                    ChainState {
                        used_index: seed_deposit,
                        slots: Vec::new(),
                    },
                    ChainState {
                        used_index: seed_change,
                        slots: Vec::new(),
                    },
                ],
                by_address: HashMap::new(),
                subscriptions: HashMap::new(),
                pending_first: HashSet::new(),
                stopped: false,
            }),
            frontier_tx,
            status_tx,
        });

        tokio::spawn(run_event_loop(shared.clone(), command_rx, status_rx));

        Self {
            shared,
            commands: command_tx,
        }
    }

    /// Resolve the address at `index`, or the first never-used address when
    /// `index` is `None`. Side-effect-free: indices beyond the watched
    /// window are derived straight from the store, without subscribing.
    pub async fn get_address(
        &self,
        chain: Chain,
        index: Option<u32>,
    ) -> Result<AddressInfo, WalletError> {
        let unresolved = {
            let state = self.shared.state();
            let chain_state = &state.chains[chain.pos()];
            match index {
                Some(i) => match chain_state.slots.get(i as usize) {
                    Some(slot) => {
                        return Ok(AddressInfo {
                            chain,
                            index: i,
                            address: slot.address.clone(),
                            token_address: slot.token_address.clone(),
                        })
                    }
                    None => i,
                },
                None => {
                    match chain_state.slots.iter().find(|slot| slot.status.is_none()) {
                        Some(slot) => {
                            return Ok(AddressInfo {
                                chain,
                                index: slot.index,
                                address: slot.address.clone(),
                                token_address: slot.token_address.clone(),
                            })
                        }
                        None => chain_state.watched_count(),
                    }
                }
            }
        };

        let record = self
            .shared
            .store
            .get_by_index(unresolved, chain.is_change())
            .await?;
        Ok(AddressInfo {
            chain,
            index: unresolved,
            address: record.address,
            token_address: record.token_address,
        })
    }

    /// Establish subscriptions covering the full discovery window on both
    /// chains. Resolves once every address in the target range has delivered
    /// its first status, so completion is a consistency barrier. Idempotent;
    /// overlapping calls serialize behind any in-flight extension.
    pub async fn watch(&self) -> Result<(), WalletError> {
        self.command(|done| Command::Watch { done }).await
    }

    /// Widen the watched window on both chains by at least `extra`
    /// addresses, independent of observed activity. Same completion barrier
    /// as `watch`.
    pub async fn scan_more_addresses(&self, extra: u32) -> Result<(), WalletError> {
        self.command(|done| Command::ScanMore { extra, done }).await
    }

    /// Cancel every live subscription. The scanner is defunct afterwards.
    pub async fn stop(&self) -> Result<(), WalletError> {
        self.command(|done| Command::Stop { done }).await
    }

    async fn command<F>(&self, make: F) -> Result<(), WalletError>
    where
        F: FnOnce(oneshot::Sender<Result<(), WalletError>>) -> Command,
    {
        let (done_tx, done_rx) = oneshot::channel();
        self.commands
            .send(make(done_tx))
            .map_err(|_| WalletError::Stopped)?;
        done_rx.await.map_err(|_| WalletError::Stopped)?
    }

    /// Suspend until the chain's frontier reaches `target`, or a bounded
    /// idle period passes with no notifications at all. Returns the frontier
    /// value reached either way.
    pub async fn wait_for_update(&self, chain: Chain, target: u32) -> Result<u32, WalletError> {
        let mut rx = self.shared.frontier_tx[chain.pos()].subscribe();
        loop {
            let frontier = *rx.borrow_and_update();
            if frontier.used_index >= target {
                return Ok(frontier.used_index);
            }
            match tokio::time::timeout(self.shared.idle_timeout, rx.changed()).await {
                Ok(Ok(())) => continue,
                // Idle period elapsed, or the scanner went away entirely
                Ok(Err(_)) | Err(_) => return Ok(frontier.used_index),
            }
        }
    }

    pub fn used_index(&self, chain: Chain) -> u32 {
        self.shared.state().chains[chain.pos()].used_index
    }

    pub fn watched_count(&self, chain: Chain) -> u32 {
        self.shared.state().chains[chain.pos()].watched_count()
    }

    /// Snapshot of a chain's slot table.
    pub fn slots(&self, chain: Chain) -> Vec<AddressSlot> {
        self.shared.state().chains[chain.pos()].slots.clone()
    }

    /// Addresses that ever had activity, with their token-aware forms.
    pub fn discovered(&self) -> Vec<(String, Option<String>)> {
        let state = self.shared.state();
        Chain::ALL
            .iter()
            .flat_map(|chain| state.chains[chain.pos()].slots.iter())
            .filter(|slot| slot.status.is_some())
            .map(|slot| (slot.address.clone(), slot.token_address.clone()))
            .collect()
    }

    /// Aggregate unspent view over every discovered slot.
    pub fn balance(&self) -> Balance {
        let state = self.shared.state();
        balance::aggregate(
            Chain::ALL
                .iter()
                .flat_map(|chain| state.chains[chain.pos()].slots.iter()),
        )
    }
}

async fn run_event_loop(
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut statuses: mpsc::UnboundedReceiver<StatusUpdate>,
) {
    let mut barriers: Vec<Barrier> = Vec::new();
    loop {
        tokio::select! {
            Some(command) = commands.recv() => match command {
                Command::Watch { done } => {
                    let result = watch_pass(&shared).await;
                    finish_pass(&shared, &mut barriers, result, done);
                }
                Command::ScanMore { extra, done } => {
                    let result = scan_more_pass(&shared, extra).await;
                    finish_pass(&shared, &mut barriers, result, done);
                }
                Command::Stop { done } => {
                    shutdown(&shared, &mut barriers).await;
                    let _ = done.send(Ok(()));
                    break;
                }
            },
            Some(update) = statuses.recv() => {
                handle_delivery(&shared, &mut barriers, update).await;
            }
            else => break,
        }
    }
}

/// Extend both chains to the full gap target.
async fn watch_pass(shared: &Arc<Shared>) -> Result<(), WalletError> {
    for chain in Chain::ALL {
        let target = {
            let state = shared.state();
            let chain_state = &state.chains[chain.pos()];
            chain_state
                .watched_count()
                .max(chain_state.used_index + shared.gap_limit)
        };
        // The pass runs before its barrier is registered, so the snapshot of
        // pending_first taken in finish_pass already covers these addresses.
        extend_chain(shared, chain, target, &mut Vec::new()).await?;
    }
    Ok(())
}

async fn scan_more_pass(shared: &Arc<Shared>, extra: u32) -> Result<(), WalletError> {
    for chain in Chain::ALL {
        let target = {
            let state = shared.state();
            state.chains[chain.pos()].watched_count() + extra
        };
        extend_chain(shared, chain, target, &mut Vec::new()).await?;
    }
    Ok(())
}

/// Park the caller behind the outstanding first deliveries, if any.
fn finish_pass(
    shared: &Arc<Shared>,
    barriers: &mut Vec<Barrier>,
    result: Result<(), WalletError>,
    done: oneshot::Sender<Result<(), WalletError>>,
) {
    match result {
        Err(e) => {
            let _ = done.send(Err(e));
        }
        Ok(()) => {
            let pending = shared.state().pending_first.clone();
            if pending.is_empty() {
                let _ = done.send(Ok(()));
            } else {
                barriers.push(Barrier { pending, done });
            }
        }
    }
}

/// Grow a chain's slot table (and subscriptions) up to `target` indices.
/// Each new slot is seeded from the snapshot the store held before its
/// subscription opened. Every address subscribed here is appended to
/// `new_addresses`, even when a later index fails, so callers can fold the
/// partial range into in-flight barriers.
async fn extend_chain(
    shared: &Arc<Shared>,
    chain: Chain,
    target: u32,
    new_addresses: &mut Vec<String>,
) -> Result<(), WalletError> {
    loop {
        let next = {
            let state = shared.state();
            if state.stopped {
                return Err(WalletError::Stopped);
            }
            let len = state.chains[chain.pos()].watched_count();
            if len >= target {
                return Ok(());
            }
            len
        };

        let record = shared.store.get_by_index(next, chain.is_change()).await?;
        let address = record.address.clone();

        // Subscribe before the slot is registered: the baseline delivery
        // queues behind this handler either way, and a failed subscribe
        // leaves no orphaned pending entry behind.
        let subscription = shared
            .provider
            .subscribe_address(&address, shared.status_tx.clone())
            .await?;

        {
            let mut state = shared.state();
            let slot = AddressSlot {
                index: next,
                chain,
                address: address.clone(),
                token_address: record.token_address,
                status: record.status,
                utxos: record.utxos,
                raw_history: record.raw_history,
            };
            state.chains[chain.pos()].slots.push(slot);
            state.by_address.insert(address.clone(), (chain, next));
            state.pending_first.insert(address.clone());
            state.subscriptions.insert(address.clone(), subscription);
        }
        new_addresses.push(address);

        log::debug!(
            "watching {:?} index {} (window now {})",
            chain,
            next,
            next + 1
        );
    }
}

/// Fold one status delivery into the slot table. The slot's stored status is
/// re-read here, at handling time, so racing deliveries for one address
/// converge to the later value exactly once; a redundant re-delivery is a
/// no-op. The baseline (first) delivery is processed through the same path
/// even when it matches the seeded snapshot, so a restored used address
/// still triggers the frontier check.
async fn handle_delivery(shared: &Arc<Shared>, barriers: &mut Vec<Barrier>, update: StatusUpdate) {
    let address = update.address;

    let located = {
        let state = shared.state();
        if state.stopped {
            return;
        }
        state.by_address.get(&address).copied()
    };
    let Some((chain, index)) = located else {
        log::debug!("status delivery for unknown address {}", address);
        return;
    };

    let (previous, first_delivery) = {
        let state = shared.state();
        (
            state.chains[chain.pos()].slots[index as usize].status.clone(),
            state.pending_first.contains(&address),
        )
    };

    let mut failure: Option<String> = None;

    if update.status != previous || (first_delivery && update.status.is_some()) {
        match update.status.clone() {
            Some(new_status) => {
                let fetched = tokio::join!(
                    shared.provider.get_utxos(&address),
                    shared.provider.get_history(&address, None, None)
                );
                match fetched {
                    (Ok(utxos), Ok(raw_history)) => {
                        let advanced = {
                            let mut state = shared.state();
                            let chain_state = &mut state.chains[chain.pos()];
                            let slot = &mut chain_state.slots[index as usize];
                            slot.status = Some(new_status.clone());
                            slot.utxos = utxos.clone();
                            slot.raw_history = raw_history;
                            if index + 1 > chain_state.used_index {
                                chain_state.used_index = index + 1;
                                true
                            } else {
                                false
                            }
                        };

                        if let Err(e) = persist_slot(shared, &address, Some(new_status), &utxos).await
                        {
                            failure = Some(e.to_string());
                        }

                        if advanced {
                            log::info!(
                                "{:?} frontier advanced to {} on {}",
                                chain,
                                index + 1,
                                address
                            );
                        }

                        if advanced && failure.is_none() {
                            let runway_exhausted = {
                                let state = shared.state();
                                let chain_state = &state.chains[chain.pos()];
                                chain_state.used_index + 1 >= chain_state.watched_count()
                            };
                            // Activity at the edge of the window pulls it
                            // forward; a deep incoming transaction can do
                            // this across several passes.
                            if runway_exhausted {
                                let target = {
                                    let state = shared.state();
                                    state.chains[chain.pos()].used_index + shared.gap_limit
                                };
                                let mut extended = Vec::new();
                                if let Err(e) =
                                    extend_chain(shared, chain, target, &mut extended).await
                                {
                                    failure = Some(e.to_string());
                                }
                                // An in-flight watch() is a consistency
                                // barrier over the whole window, so it must
                                // also wait for the range this extension
                                // just subscribed.
                                for barrier in barriers.iter_mut() {
                                    barrier.pending.extend(extended.iter().cloned());
                                }
                            }
                        }
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        // Leave the stored status untouched so a redelivery
                        // reconverges.
                        log::warn!("failed to refresh {}: {}", address, e);
                        failure = Some(e.to_string());
                    }
                }
            }
            None => {
                {
                    let mut state = shared.state();
                    let slot = &mut state.chains[chain.pos()].slots[index as usize];
                    slot.status = None;
                    slot.utxos.clear();
                }
                log::info!("{} reverted to never-used, clearing utxos", address);
                if let Err(e) = persist_slot(shared, &address, None, &[]).await {
                    failure = Some(e.to_string());
                }
            }
        }
    }

    // Publish after any window extension settled, so a woken waiter
    // observes the post-extension state. Redundant re-deliveries still
    // bump the delivery counter for idle tracking.
    publish(shared, chain);

    shared.state().pending_first.remove(&address);
    settle_barriers(barriers, &address, failure);
}

async fn persist_slot(
    shared: &Arc<Shared>,
    address: &str,
    status: AddressStatus,
    utxos: &[Utxo],
) -> Result<(), WalletError> {
    shared
        .store
        .set_status_and_utxos(address, status, utxos)
        .await?;
    shared.store.persist().await
}

fn publish(shared: &Arc<Shared>, chain: Chain) {
    let used_index = shared.state().chains[chain.pos()].used_index;
    shared.frontier_tx[chain.pos()].send_modify(|frontier| {
        frontier.used_index = used_index;
        frontier.deliveries += 1;
    });
}

/// Tick `address` off every waiting barrier. A failed delivery fails the
/// whole watch call covering it; there is no partial success.
fn settle_barriers(barriers: &mut Vec<Barrier>, address: &str, failure: Option<String>) {
    let mut index = 0;
    while index < barriers.len() {
        if !barriers[index].pending.remove(address) {
            index += 1;
            continue;
        }
        if let Some(message) = &failure {
            let barrier = barriers.swap_remove(index);
            let _ = barrier.done.send(Err(WalletError::Provider(message.clone())));
        } else if barriers[index].pending.is_empty() {
            let barrier = barriers.swap_remove(index);
            let _ = barrier.done.send(Ok(()));
        } else {
            index += 1;
        }
    }
}

/// Cancel every subscription ever opened, including those past the final
/// frontier.
async fn shutdown(shared: &Arc<Shared>, barriers: &mut Vec<Barrier>) {
    let subscriptions: Vec<(String, SubscriptionId)> = {
        let mut state = shared.state();
        state.stopped = true;
        state.subscriptions.drain().collect()
    };

    log::info!("stopping scanner, cancelling {} subscriptions", subscriptions.len());
    for (address, id) in subscriptions {
        if let Err(e) = shared.provider.unsubscribe(id).await {
            log::warn!("failed to unsubscribe {}: {}", address, e);
        }
    }

    for barrier in barriers.drain(..) {
        let _ = barrier.done.send(Err(WalletError::Stopped));
    }
}
