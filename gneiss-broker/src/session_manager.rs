/*
 * Copyright Bret Ambrose. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

/*!
In-memory registry of client sessions, plus the fan-out of published messages to every session
with a matching subscription.

Lock order is registry first, then a session's own locks.  Fan-out snapshots the matching
sessions under the registry's read lock and enqueues after releasing it.
 */

use crate::config::*;
use crate::error::{BrokerError, BrokerResult};
use crate::mqtt::*;
use crate::retained::*;
use crate::session::*;
use crate::validate::*;

use log::*;
use rand::distributions::Alphanumeric;
use rand::Rng;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Result of binding a CONNECT to a session
#[derive(Debug)]
pub struct SessionCreation {

    /// The session the connection is now bound to
    pub session: Arc<Session>,

    /// True if an existing persistent session was resumed.  Reported to the client in CONNACK.
    pub session_present: bool,
}

/// Owns every session on the server, keyed by client id
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    options: Arc<ServerOptions>,
    retained_messages: Arc<dyn RetainedMessageStore>,
}

impl SessionManager {

    /// Creates a session manager with an in-memory retained message store sized by the options
    pub fn new(options: ServerOptions) -> SessionManager {
        let retained_messages = Arc::new(InMemoryRetainedMessageStore::new(options.maximum_retained_messages));
        SessionManager::new_with_retained_store(options, retained_messages)
    }

    /// Creates a session manager backed by an external retained message store
    pub fn new_with_retained_store(options: ServerOptions, retained_messages: Arc<dyn RetainedMessageStore>) -> SessionManager {
        SessionManager {
            sessions: RwLock::new(HashMap::new()),
            options: Arc::new(options),
            retained_messages,
        }
    }

    fn read_sessions(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_sessions(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn retained_store(&self) -> &dyn RetainedMessageStore {
        self.retained_messages.as_ref()
    }

    fn generate_client_id(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.options.assigned_client_id_length)
            .map(char::from)
            .collect()
    }

    /// Binds a connecting client to a session.
    ///
    /// A client asking to resume (clean session not set) whose id maps to a persistent session
    /// gets that session back: its latest CONNECT is replaced and its unacknowledged publishes
    /// are recovered.  In every other case a fresh session replaces whatever was registered under
    /// the id.  A client with an empty id is assigned a random one, but only if it asked for a
    /// clean session.
    pub fn create_session(&self, connect: &ConnectPacket) -> BrokerResult<SessionCreation> {
        let mut connect = connect.clone();
        if connect.client_id.is_empty() {
            if !connect.clean_session {
                let message = "SessionManager::create_session - empty client id requires a clean session";
                error!("{}", message);
                return Err(BrokerError::new_protocol_violation(message));
            }

            connect.client_id = self.generate_client_id();
            debug!("SessionManager - assigned client id \"{}\"", connect.client_id);
        }

        let client_id = connect.client_id.clone();
        let mut sessions = self.write_sessions();

        if !connect.clean_session {
            if let Some(existing) = sessions.get(&client_id) {
                if existing.is_persistent() {
                    existing.set_latest_connect(connect);
                    let recovered = existing.recover();
                    info!("SessionManager - resumed session \"{}\" with {} unacknowledged publishes", client_id, recovered);

                    return Ok(SessionCreation {
                        session: existing.clone(),
                        session_present: true,
                    });
                }
            }
        }

        let session = Arc::new(Session::new(connect, self.options.clone()));
        if sessions.insert(client_id.clone(), session.clone()).is_some() {
            info!("SessionManager - replaced existing session \"{}\"", client_id);
        } else {
            info!("SessionManager - created session \"{}\"", client_id);
        }

        Ok(SessionCreation {
            session,
            session_present: false,
        })
    }

    pub fn lookup_session(&self, client_id: &str) -> Option<Arc<Session>> {
        self.read_sessions().get(client_id).cloned()
    }

    /// Removes a session unconditionally, returning it if it existed
    pub fn delete_session(&self, client_id: &str) -> Option<Arc<Session>> {
        let removed = self.write_sessions().remove(client_id);
        if removed.is_some() {
            info!("SessionManager - deleted session \"{}\"", client_id);
        }

        removed
    }

    /// Removes a session only if it is still the one registered under its client id.  A
    /// connection that was taken over by a newer one uses this so it cannot remove its
    /// successor's session.
    pub fn delete_session_if_current(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.write_sessions();
        if !Self::is_registered(&sessions, session) {
            debug!("SessionManager - session \"{}\" was replaced, nothing to delete", session.client_id());
            return false;
        }

        sessions.remove(session.client_id());
        info!("SessionManager - deleted session \"{}\"", session.client_id());
        true
    }

    /// Called when a client's connection ends.  Clean sessions are discarded; persistent
    /// sessions stay registered for the client to resume.  A session that has since been
    /// replaced under the same client id is left alone.  Returns true if the session was
    /// removed.
    pub fn end_session(&self, session: &Arc<Session>) -> bool {
        let client_id = session.client_id();
        let mut sessions = self.write_sessions();
        if !Self::is_registered(&sessions, session) {
            debug!("SessionManager - session \"{}\" was replaced, nothing to end", client_id);
            return false;
        }

        if session.is_persistent() {
            debug!("SessionManager - keeping persistent session \"{}\"", client_id);
            return false;
        }

        sessions.remove(client_id);
        info!("SessionManager - ended clean session \"{}\"", client_id);
        true
    }

    fn is_registered(sessions: &HashMap<String, Arc<Session>>, session: &Arc<Session>) -> bool {
        match sessions.get(session.client_id()) {
            Some(registered) => { Arc::ptr_eq(registered, session) }
            None => { false }
        }
    }

    pub fn session_count(&self) -> usize {
        self.read_sessions().len()
    }

    /// Every session subscribed to the topic, paired with the highest QoS granted among its
    /// matching filters
    pub fn match_topic(&self, topic: &str) -> Vec<(String, QualityOfService)> {
        self.read_sessions().iter()
            .filter_map(|(client_id, session)| {
                session.subscriptions().match_topic(topic).iter()
                    .map(|matched| matched.granted_qos)
                    .max()
                    .map(|granted_qos| (client_id.clone(), granted_qos))
            })
            .collect()
    }

    /// Routes a published message.
    ///
    /// A retained message first updates the retained store, where an empty payload clears the
    /// topic.  The message is then enqueued once on every subscribed session at the effective
    /// QoS, with the retain flag cleared.  A session that cannot take the message is logged and
    /// skipped; only an invalid topic fails the dispatch.  Returns the number of sessions that
    /// accepted the message.
    pub fn dispatch_application_message(&self, message: &ApplicationMessage) -> BrokerResult<usize> {
        if !is_valid_topic(&message.topic) {
            let error_message = format!("SessionManager::dispatch_application_message - invalid topic \"{}\"", message.topic);
            error!("{}", error_message);
            return Err(BrokerError::new_protocol_violation(error_message));
        }

        if message.retain {
            if message.payload.is_empty() {
                if self.retained_messages.remove(&message.topic).is_some() {
                    debug!("SessionManager - cleared retained message for \"{}\"", message.topic);
                }
            } else {
                self.retained_messages.put(&message.topic, message.clone());
            }
        }

        let recipients : Vec<(Arc<Session>, QualityOfService)> = self.read_sessions().values()
            .filter_map(|session| {
                session.subscriptions().effective_qos(&message.topic, message.qos)
                    .map(|qos| (session.clone(), qos))
            })
            .collect();

        let delivery = ApplicationMessage {
            retain: false,
            ..message.clone()
        };

        let mut delivered = 0;
        for (session, qos) in recipients {
            match session.enqueue_application_message(&delivery, qos) {
                Ok(PacketEnqueueResult::DroppedNewMessage) => {}
                Ok(_) => { delivered += 1; }
                Err(error) => {
                    warn!("SessionManager::dispatch_application_message - failed to enqueue on session \"{}\": {}", session.client_id(), error);
                }
            }
        }

        debug!("SessionManager - dispatched message on \"{}\" to {} sessions", message.topic, delivered);

        Ok(delivered)
    }

    /// Publishes a session's will message, if it has one that has not been sent or cleared
    pub fn dispatch_will_message(&self, session: &Session) -> BrokerResult<usize> {
        match session.take_will_message() {
            Some(will) => {
                info!("SessionManager - publishing will message of \"{}\" to \"{}\"", session.client_id(), will.topic);
                self.dispatch_application_message(&will)
            }
            None => { Ok(0) }
        }
    }
}
