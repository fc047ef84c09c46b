// Copyright 2026 the xrbridge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared images and the cross-API handoff protocol.
//!
//! A [`SharedResource`] is one image living in both API contexts, paired with
//! one timeline counter (a present-API fence imported as a render-API
//! timeline semaphore). Ownership moves between the APIs by counter value:
//!
//! ```text
//!   counter   render stream              present stream
//!   ───────   ─────────────              ──────────────
//!      0      wait(0) ─ write ─ signal(1)
//!      1                                 wait(1) ─ sample ─ signal(2)
//!      2      wait(2) ─ write ─ signal(3)
//!      3                                 wait(3) ─ ...
//! ```
//!
//! The rules (wait on exactly the last value the other side signaled, signal
//! exactly one more, never reuse a value) are carried by move-only tokens:
//!
//! - [`Handoff<A>`] is the right for API `A` to wait. It is created only by
//!   the other API's signal (or by import, for the first render write).
//! - [`ResourceStore::wait_before_write`] consumes a `Handoff<A>` and returns
//!   a [`WriteAccess<A>`].
//! - [`ResourceStore::signal_after_write`] consumes the `WriteAccess<A>` and
//!   returns a `Handoff<A::Other>`.
//!
//! Neither token is `Clone`, so a value cannot be waited twice or signaled
//! twice, and a render token cannot be handed to a present stream.
//!
//! Resources live in a [`ResourceStore`] behind generational [`ResourceId`]s.
//! Present-side users return their `Handoff<Render>` to the store with
//! [`park`](ResourceStore::park); the render side collects it next frame
//! with [`take_parked`](ResourceStore::take_parked).

use core::fmt;
use core::marker::PhantomData;

use crate::api::{AccessState, ApiId, Format, GraphicsApi, ImageLayout, Render, ResourceState};
use crate::composition::Extent;
use crate::device::{ClearValue, CommandStream, ResourceExporter, ResourceImporter, SurfaceDesc};
use crate::error::{ProtocolError, Result};
use crate::handle::{NativeImage, ResourceId, SyncHandle};
use crate::trace::{HandoffEvent, HandoffOp, Tracer};

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// The right for API `A` to wait on a resource and then write it.
///
/// Carries the counter value `A` must wait for.
#[must_use = "dropping a handoff leaves the resource owned by nobody"]
pub struct Handoff<A: GraphicsApi> {
    resource: ResourceId,
    value: u64,
    _api: PhantomData<fn() -> A>,
}

impl<A: GraphicsApi> Handoff<A> {
    const fn new(resource: ResourceId, value: u64) -> Self {
        Self {
            resource,
            value,
            _api: PhantomData,
        }
    }

    /// The resource this token belongs to.
    #[must_use]
    pub const fn resource(&self) -> ResourceId {
        self.resource
    }

    /// The counter value to wait for.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }
}

impl<A: GraphicsApi> fmt::Debug for Handoff<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handoff<{}>({:?} = {})", A::ID, self.resource, self.value)
    }
}

/// Proof that API `A` has waited and may now write the resource.
#[must_use = "dropping write access leaves the resource owned by nobody"]
pub struct WriteAccess<A: GraphicsApi> {
    resource: ResourceId,
    value: u64,
    _api: PhantomData<fn() -> A>,
}

impl<A: GraphicsApi> WriteAccess<A> {
    /// The resource this access is for.
    #[must_use]
    pub const fn resource(&self) -> ResourceId {
        self.resource
    }

    /// The counter value that was waited for.
    #[must_use]
    pub const fn waited(&self) -> u64 {
        self.value
    }
}

impl<A: GraphicsApi> fmt::Debug for WriteAccess<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WriteAccess<{}>({:?} @ {})", A::ID, self.resource, self.value)
    }
}

// ---------------------------------------------------------------------------
// SharedResource
// ---------------------------------------------------------------------------

/// One API's view of a shared image.
#[derive(Clone, Copy, Debug)]
pub struct ApiSide<S> {
    pub(crate) image: NativeImage,
    pub(crate) sync: SyncHandle,
    pub(crate) format: Format,
    pub(crate) state: S,
}

impl<S: Copy> ApiSide<S> {
    /// The native image on this side.
    #[must_use]
    pub const fn image(&self) -> NativeImage {
        self.image
    }

    /// The native timeline object on this side.
    #[must_use]
    pub const fn sync(&self) -> SyncHandle {
        self.sync
    }

    /// The image format on this side.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// The last access state recorded on this side.
    #[must_use]
    pub const fn state(&self) -> S {
        self.state
    }
}

/// An image shared between the render and present APIs.
#[derive(Debug)]
pub struct SharedResource {
    id: ResourceId,
    extent: Extent,
    pub(crate) render: ApiSide<ImageLayout>,
    pub(crate) present: ApiSide<ResourceState>,
    counter: u64,
}

impl SharedResource {
    /// This resource's id.
    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// Size in texels.
    #[must_use]
    pub const fn extent(&self) -> Extent {
        self.extent
    }

    /// The last signaled counter value (0 before any handoff).
    #[must_use]
    pub const fn counter(&self) -> u64 {
        self.counter
    }

    /// API `A`'s view of this resource.
    #[must_use]
    pub fn side<A: GraphicsApi>(&self) -> &ApiSide<A::State> {
        A::side(self)
    }

    fn wait_before_write<A, S>(
        &mut self,
        stream: &mut S,
        token: Handoff<A>,
    ) -> Result<WriteAccess<A>, ProtocolError>
    where
        A: GraphicsApi,
        S: CommandStream<A> + ?Sized,
    {
        if token.resource != self.id {
            return Err(ProtocolError::UnknownResource(token.resource));
        }
        if token.value != self.counter {
            return Err(ProtocolError::OutOfOrder {
                id: self.id,
                api: A::ID,
                expected: token.value,
                actual: self.counter,
            });
        }
        stream.wait(A::side(self).sync, token.value);
        Ok(WriteAccess {
            resource: self.id,
            value: token.value,
            _api: PhantomData,
        })
    }

    fn signal_after_write<A, S>(
        &mut self,
        stream: &mut S,
        access: WriteAccess<A>,
    ) -> Result<Handoff<A::Other>, ProtocolError>
    where
        A: GraphicsApi,
        S: CommandStream<A> + ?Sized,
    {
        if access.resource != self.id {
            return Err(ProtocolError::UnknownResource(access.resource));
        }
        if access.value != self.counter {
            return Err(ProtocolError::OutOfOrder {
                id: self.id,
                api: A::ID,
                expected: access.value,
                actual: self.counter,
            });
        }
        let next = self
            .counter
            .checked_add(1)
            .ok_or(ProtocolError::CounterExhausted(self.id))?;
        stream.signal(A::side(self).sync, next);
        self.counter = next;
        Ok(Handoff::new(self.id, next))
    }

    /// Records a transition of `A`'s side to `to`, skipping it when the side
    /// is already there.
    pub fn transition<A, S>(&mut self, _access: &WriteAccess<A>, stream: &mut S, to: A::State)
    where
        A: GraphicsApi,
        S: CommandStream<A> + ?Sized,
    {
        let side = A::side_mut(self);
        if side.state == to {
            return;
        }
        stream.transition(side.image, side.format, side.state, to);
        side.state = to;
    }

    /// Copies `src` (a same-API image in its copy-source state) into this
    /// resource.
    pub fn copy_from<A, S>(&mut self, access: &WriteAccess<A>, stream: &mut S, src: NativeImage)
    where
        A: GraphicsApi,
        S: CommandStream<A> + ?Sized,
    {
        self.transition(access, stream, <A::State as AccessState>::COPY_DEST);
        stream.full_barrier();
        let side = A::side(self);
        stream.copy_image(
            src,
            side.image,
            side.format,
            <A::State as AccessState>::COPY_SOURCE,
            side.state,
            self.extent,
        );
        stream.full_barrier();
    }

    /// Copies this resource into `dst` (a same-API image in its
    /// copy-destination state).
    pub fn copy_to<A, S>(&mut self, access: &WriteAccess<A>, stream: &mut S, dst: NativeImage)
    where
        A: GraphicsApi,
        S: CommandStream<A> + ?Sized,
    {
        self.transition(access, stream, <A::State as AccessState>::COPY_SOURCE);
        stream.full_barrier();
        let side = A::side(self);
        stream.copy_image(
            side.image,
            dst,
            side.format,
            side.state,
            <A::State as AccessState>::COPY_DEST,
            self.extent,
        );
        stream.full_barrier();
    }

    /// Clears this resource on `A`'s side.
    ///
    /// A color value on a depth image (or the reverse) is rejected.
    pub fn clear<A, S>(
        &mut self,
        access: &WriteAccess<A>,
        stream: &mut S,
        value: ClearValue,
    ) -> Result<(), ProtocolError>
    where
        A: GraphicsApi,
        S: CommandStream<A> + ?Sized,
    {
        let format = A::side(self).format;
        let kind = format.kind();
        let matches = matches!(
            (kind, value),
            (crate::api::FormatKind::Color, ClearValue::Color(_))
                | (crate::api::FormatKind::Depth, ClearValue::Depth(_))
        );
        if !matches {
            tracing::error!(
                resource = %self.id,
                ?format,
                value = value.kind_name(),
                "clear kind mismatch"
            );
            return Err(ProtocolError::ClearKindMismatch {
                id: self.id,
                format,
                value: value.kind_name(),
            });
        }
        if let Some(to) = A::side(self).state.clear_target(kind) {
            self.transition(access, stream, to);
        }
        stream.full_barrier();
        let side = A::side(self);
        stream.clear(side.image, format, side.state, value);
        stream.full_barrier();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ResourceStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot {
    generation: u32,
    resource: Option<SharedResource>,
    parked: Option<Handoff<Render>>,
    last_parked: Option<u64>,
}

/// Per-API handoff counters, for periodic logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandoffCounts {
    /// Waits recorded.
    pub waits: u64,
    /// Signals recorded.
    pub signals: u64,
}

/// Owns every [`SharedResource`] of a session.
#[derive(Debug)]
pub struct ResourceStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    counts: [HandoffCounts; 2],
    log_interval: u32,
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new(500)
    }
}

const fn api_slot(api: ApiId) -> usize {
    match api {
        ApiId::Render => 0,
        ApiId::Present => 1,
    }
}

impl ResourceStore {
    /// Creates an empty store that logs a handoff summary every
    /// `log_interval` operations per API (0 disables the summary).
    #[must_use]
    pub fn new(log_interval: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            counts: [HandoffCounts::default(); 2],
            log_interval,
        }
    }

    /// Number of live resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.resource.is_some()).count()
    }

    /// Returns `true` if no resources are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handoff counters for `api`.
    #[must_use]
    pub const fn counts(&self, api: ApiId) -> HandoffCounts {
        self.counts[api_slot(api)]
    }

    /// Creates a shared image on the present device, imports it on the
    /// render device, and moves the render side to its interop baseline.
    ///
    /// The first [`Handoff<Render>`] (value 0) is parked in the store.
    pub fn import<S>(
        &mut self,
        desc: &SurfaceDesc,
        exporter: &mut dyn ResourceExporter,
        importer: &mut dyn ResourceImporter,
        stream: &mut S,
    ) -> Result<ResourceId>
    where
        S: CommandStream<Render> + ?Sized,
    {
        if let Err(err) = importer.caps().require_all() {
            tracing::error!(?desc, "cannot import shared image: {err}");
            return Err(err.into());
        }
        let exported = exporter.export(desc)?;
        let imported = importer.import(desc, exported.os_image, exported.os_sync)?;

        let id = self.allocate();
        let mut resource = SharedResource {
            id,
            extent: desc.extent,
            render: ApiSide {
                image: imported.image,
                sync: imported.sync,
                format: desc.render_format,
                state: ImageLayout::Undefined,
            },
            present: ApiSide {
                image: exported.image,
                sync: exported.sync,
                format: desc.present_format,
                state: ResourceState::INITIAL,
            },
            counter: 0,
        };
        stream.transition(
            resource.render.image,
            resource.render.format,
            ImageLayout::Undefined,
            ImageLayout::INITIAL,
        );
        resource.render.state = ImageLayout::INITIAL;

        tracing::debug!(
            resource = %id,
            width = desc.extent.width,
            height = desc.extent.height,
            render_format = ?desc.render_format,
            present_format = ?desc.present_format,
            "imported shared image"
        );

        let slot = &mut self.slots[id.idx as usize];
        slot.resource = Some(resource);
        slot.parked = Some(Handoff::new(id, 0));
        slot.last_parked = Some(0);
        Ok(id)
    }

    fn allocate(&mut self) -> ResourceId {
        if let Some(idx) = self.free.pop() {
            let generation = self.slots[idx as usize].generation;
            return ResourceId { idx, generation };
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "more than u32::MAX shared images is not a realistic session"
        )]
        let idx = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            resource: None,
            parked: None,
            last_parked: None,
        });
        ResourceId { idx, generation: 0 }
    }

    fn slot(&self, id: ResourceId) -> Result<&Slot, ProtocolError> {
        self.slots
            .get(id.idx as usize)
            .filter(|s| s.generation == id.generation && s.resource.is_some())
            .ok_or(ProtocolError::UnknownResource(id))
    }

    fn slot_mut(&mut self, id: ResourceId) -> Result<&mut Slot, ProtocolError> {
        self.slots
            .get_mut(id.idx as usize)
            .filter(|s| s.generation == id.generation && s.resource.is_some())
            .ok_or(ProtocolError::UnknownResource(id))
    }

    /// Returns the resource for `id`.
    pub fn get(&self, id: ResourceId) -> Result<&SharedResource, ProtocolError> {
        self.slot(id)?
            .resource
            .as_ref()
            .ok_or(ProtocolError::UnknownResource(id))
    }

    /// Returns the resource for `id` mutably, for copies and clears.
    pub fn get_mut(&mut self, id: ResourceId) -> Result<&mut SharedResource, ProtocolError> {
        self.slot_mut(id)?
            .resource
            .as_mut()
            .ok_or(ProtocolError::UnknownResource(id))
    }

    /// Removes a resource. Its id becomes stale.
    ///
    /// The native objects belong to the exporter and importer; destroy them
    /// there after the devices are idle.
    pub fn destroy(&mut self, id: ResourceId) -> Result<SharedResource, ProtocolError> {
        let slot = self.slot_mut(id)?;
        let resource = slot
            .resource
            .take()
            .ok_or(ProtocolError::UnknownResource(id))?;
        slot.parked = None;
        slot.last_parked = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.idx);
        Ok(resource)
    }

    /// Takes the parked render-side token for `id`.
    pub fn take_parked(&mut self, id: ResourceId) -> Result<Handoff<Render>, ProtocolError> {
        self.slot_mut(id)?
            .parked
            .take()
            .ok_or(ProtocolError::NotParked(id))
    }

    /// Returns a render-side token to the store until the renderer needs it.
    pub fn park(&mut self, token: Handoff<Render>) -> Result<(), ProtocolError> {
        let slot = self.slot_mut(token.resource)?;
        if let Some(last) = slot.last_parked
            && token.value <= last
        {
            tracing::warn!(
                resource = %token.resource,
                last,
                value = token.value,
                "parked handoff value did not increase"
            );
        }
        slot.last_parked = Some(token.value);
        slot.parked = Some(token);
        Ok(())
    }

    /// Records, on `A`'s stream, a wait for the value carried by `token`.
    pub fn wait_before_write<A, S>(
        &mut self,
        stream: &mut S,
        token: Handoff<A>,
        tracer: &mut Tracer<'_>,
    ) -> Result<WriteAccess<A>, ProtocolError>
    where
        A: GraphicsApi,
        S: CommandStream<A> + ?Sized,
    {
        let id = token.resource;
        let access = self.get_mut(id)?.wait_before_write(stream, token)?;
        let value = access.value;
        tracing::trace!(resource = %id, api = %A::ID, value, "handoff wait");
        tracer.handoff(&HandoffEvent {
            resource: id,
            api: A::ID,
            op: HandoffOp::Wait,
            value,
        });
        let count = {
            let c = &mut self.counts[api_slot(A::ID)];
            c.waits += 1;
            c.waits
        };
        self.log_periodic(A::ID, "waits", count, id, value);
        Ok(access)
    }

    /// Records, on `A`'s stream, a signal of the next counter value and
    /// returns the other API's token.
    pub fn signal_after_write<A, S>(
        &mut self,
        stream: &mut S,
        access: WriteAccess<A>,
        tracer: &mut Tracer<'_>,
    ) -> Result<Handoff<A::Other>, ProtocolError>
    where
        A: GraphicsApi,
        S: CommandStream<A> + ?Sized,
    {
        let id = access.resource;
        let handoff = self.get_mut(id)?.signal_after_write(stream, access)?;
        let value = handoff.value;
        tracing::trace!(resource = %id, api = %A::ID, value, "handoff signal");
        tracer.handoff(&HandoffEvent {
            resource: id,
            api: A::ID,
            op: HandoffOp::Signal,
            value,
        });
        let count = {
            let c = &mut self.counts[api_slot(A::ID)];
            c.signals += 1;
            c.signals
        };
        self.log_periodic(A::ID, "signals", count, id, value);
        Ok(handoff)
    }

    fn log_periodic(&self, api: ApiId, what: &'static str, count: u64, id: ResourceId, value: u64) {
        if self.log_interval != 0 && count % u64::from(self.log_interval) == 0 {
            tracing::debug!(%api, count, resource = %id, value, "{what} so far");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Present;
    use crate::device::InteropCaps;
    use crate::error::{Error, ErrorClass};
    use crate::testing::{FakeExporter, FakeImporter, RecordedCmd, RecordingStream};

    fn desc() -> SurfaceDesc {
        SurfaceDesc {
            extent: Extent::new(64, 32),
            render_format: Format::Rgba8Srgb,
            present_format: Format::Rgba8Srgb,
        }
    }

    fn store_with_one() -> (ResourceStore, ResourceId, RecordingStream<Render>) {
        let mut store = ResourceStore::new(0);
        let mut render = RecordingStream::<Render>::default();
        let id = store
            .import(
                &desc(),
                &mut FakeExporter::default(),
                &mut FakeImporter::new(InteropCaps::ALL),
                &mut render,
            )
            .unwrap();
        (store, id, render)
    }

    #[test]
    fn import_parks_initial_token_and_sets_baseline() {
        let (mut store, id, render) = store_with_one();
        let res = store.get(id).unwrap();
        assert_eq!(res.counter(), 0, "fresh counter");
        assert_eq!(res.side::<Render>().state(), ImageLayout::General, "render baseline");
        assert_eq!(res.side::<Present>().state(), ResourceState::Common, "present baseline");
        assert!(
            matches!(
                render.cmds.as_slice(),
                [RecordedCmd::Transition { .. }]
            ),
            "one baseline transition recorded"
        );
        let token = store.take_parked(id).unwrap();
        assert_eq!(token.value(), 0, "first wait is on zero");
        assert!(
            matches!(store.take_parked(id), Err(ProtocolError::NotParked(_))),
            "token can only be taken once"
        );
    }

    #[test]
    fn three_handoffs_count_one_two_three() {
        let (mut store, id, _) = store_with_one();
        let mut render = RecordingStream::<Render>::default();
        let mut present = RecordingStream::<Present>::default();
        let mut tracer = Tracer::none();

        // Producer writes.
        let token = store.take_parked(id).unwrap();
        let access = store.wait_before_write(&mut render, token, &mut tracer).unwrap();
        let to_present = store.signal_after_write(&mut render, access, &mut tracer).unwrap();
        assert_eq!(store.get(id).unwrap().counter(), 1, "after first handoff");

        // Consumer samples.
        let access = store
            .wait_before_write(&mut present, to_present, &mut tracer)
            .unwrap();
        let to_render = store.signal_after_write(&mut present, access, &mut tracer).unwrap();
        assert_eq!(store.get(id).unwrap().counter(), 2, "after second handoff");
        store.park(to_render).unwrap();

        // Producer writes again.
        let token = store.take_parked(id).unwrap();
        let access = store.wait_before_write(&mut render, token, &mut tracer).unwrap();
        let last = store.signal_after_write(&mut render, access, &mut tracer).unwrap();
        assert_eq!(store.get(id).unwrap().counter(), 3, "after third handoff");
        assert_eq!(last.value(), 3, "present waits on three next");

        assert_eq!(render.waits(), vec![0, 2], "render waits on the previous signal");
        assert_eq!(render.signals(), vec![1, 3], "render signals +1");
        assert_eq!(present.waits(), vec![1], "present waits on render's signal");
        assert_eq!(present.signals(), vec![2], "present signals +1");
        assert_eq!(store.counts(ApiId::Render).signals, 2, "render signal count");
    }

    #[test]
    fn stale_token_is_rejected() {
        let (mut store, id, _) = store_with_one();
        let token = store.take_parked(id).unwrap();
        store.destroy(id).unwrap();
        let mut render = RecordingStream::<Render>::default();
        let err = store
            .wait_before_write(&mut render, token, &mut Tracer::none())
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownResource(_)), "stale id: {err}");
        assert!(render.cmds.is_empty(), "nothing recorded for a stale token");
    }

    #[test]
    fn destroyed_slot_is_reused_with_new_generation() {
        let (mut store, id, mut render) = store_with_one();
        store.destroy(id).unwrap();
        let id2 = store
            .import(
                &desc(),
                &mut FakeExporter::default(),
                &mut FakeImporter::new(InteropCaps::ALL),
                &mut render,
            )
            .unwrap();
        assert_eq!(id2.index(), id.index(), "slot reused");
        assert_ne!(id2.generation(), id.generation(), "generation bumped");
        assert!(store.get(id).is_err(), "old id is stale");
        assert_eq!(store.len(), 1, "one live resource");
    }

    #[test]
    fn import_without_external_memory_fails() {
        let mut store = ResourceStore::new(0);
        let mut render = RecordingStream::<Render>::default();
        let err = store
            .import(
                &desc(),
                &mut FakeExporter::default(),
                &mut FakeImporter::new(InteropCaps {
                    external_memory: false,
                    ..InteropCaps::ALL
                }),
                &mut render,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Capability(_)), "capability error: {err}");
        assert_eq!(err.class(), ErrorClass::Capability, "classified as capability");
        assert!(store.is_empty(), "nothing allocated");
    }

    #[test]
    fn copy_from_transitions_once_and_brackets_with_barriers() {
        let (mut store, id, _) = store_with_one();
        let mut render = RecordingStream::<Render>::default();
        let mut tracer = Tracer::none();
        let token = store.take_parked(id).unwrap();
        let access = store.wait_before_write(&mut render, token, &mut tracer).unwrap();
        let res = store.get_mut(id).unwrap();
        res.copy_from(&access, &mut render, NativeImage(0xbeef));
        res.copy_from(&access, &mut render, NativeImage(0xbeef));
        assert_eq!(
            res.side::<Render>().state(),
            ImageLayout::TransferDst,
            "left in copy destination layout"
        );
        let transitions = render
            .cmds
            .iter()
            .filter(|c| matches!(c, RecordedCmd::Transition { .. }))
            .count();
        assert_eq!(transitions, 1, "second copy does not re-transition");
        let barriers = render
            .cmds
            .iter()
            .filter(|c| matches!(c, RecordedCmd::Barrier))
            .count();
        assert_eq!(barriers, 4, "barrier before and after each copy");
        let _ = store.signal_after_write(&mut render, access, &mut tracer).unwrap();
    }

    #[test]
    fn later_stream_copy_and_clear_carry_format_and_state() {
        let mut store = ResourceStore::new(0);
        let mut exporter = FakeExporter::default();
        let mut importer = FakeImporter::new(InteropCaps::ALL);
        let mut first = RecordingStream::<Render>::default();
        let depth = SurfaceDesc {
            render_format: Format::D32Float,
            present_format: Format::D32Float,
            ..desc()
        };
        let id = store
            .import(&depth, &mut exporter, &mut importer, &mut first)
            .unwrap();
        let mut tracer = Tracer::none();
        let token = store.take_parked(id).unwrap();
        let access = store.wait_before_write(&mut first, token, &mut tracer).unwrap();
        let src = NativeImage(0xbeef);
        store.get_mut(id).unwrap().copy_from(&access, &mut first, src);

        // The next command buffer sees no transition, only the copy and clear.
        let mut second = RecordingStream::<Render>::default();
        let res = store.get_mut(id).unwrap();
        let dst = res.side::<Render>().image();
        res.copy_from(&access, &mut second, src);
        res.clear(&access, &mut second, ClearValue::Depth(1.0)).unwrap();
        assert!(
            !second.cmds.iter().any(|c| matches!(c, RecordedCmd::Transition { .. })),
            "already in the copy destination layout"
        );
        assert!(
            second.cmds.contains(&RecordedCmd::Copy {
                src,
                dst,
                format: Format::D32Float,
                src_state: ImageLayout::TransferSrc,
                dst_state: ImageLayout::TransferDst,
                extent: Extent::new(64, 32),
            }),
            "copy names the depth format and both layouts: {:?}",
            second.cmds
        );
        assert!(
            second.cmds.contains(&RecordedCmd::Clear {
                image: dst,
                format: Format::D32Float,
                state: ImageLayout::TransferDst,
                value: ClearValue::Depth(1.0),
            }),
            "clear names the layout the image is in: {:?}",
            second.cmds
        );
        let _ = store.signal_after_write(&mut second, access, &mut tracer).unwrap();
    }

    #[test]
    fn copy_to_reads_from_shared_image_state() {
        let (mut store, id, _) = store_with_one();
        let mut render = RecordingStream::<Render>::default();
        let mut tracer = Tracer::none();
        let token = store.take_parked(id).unwrap();
        let access = store.wait_before_write(&mut render, token, &mut tracer).unwrap();
        let res = store.get_mut(id).unwrap();
        res.copy_to(&access, &mut render, NativeImage(0xf00d));
        let copy = render
            .cmds
            .iter()
            .find(|c| matches!(c, RecordedCmd::Copy { .. }))
            .cloned();
        let Some(RecordedCmd::Copy {
            format,
            src_state,
            dst_state,
            ..
        }) = copy
        else {
            panic!("no copy recorded: {:?}", render.cmds);
        };
        assert_eq!(format, Format::Rgba8Srgb, "shared image format");
        assert_eq!(src_state, ImageLayout::TransferSrc, "shared image as source");
        assert_eq!(dst_state, ImageLayout::TransferDst, "caller image as destination");
        let _ = store.signal_after_write(&mut render, access, &mut tracer).unwrap();
    }

    #[test]
    fn clear_with_wrong_kind_is_rejected() {
        let (mut store, id, _) = store_with_one();
        let mut render = RecordingStream::<Render>::default();
        let token = store.take_parked(id).unwrap();
        let access = store
            .wait_before_write(&mut render, token, &mut Tracer::none())
            .unwrap();
        let res = store.get_mut(id).unwrap();
        let err = res
            .clear(&access, &mut render, ClearValue::Depth(1.0))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ClearKindMismatch { .. }), "{err}");
        res.clear(&access, &mut render, ClearValue::Color([0.0; 4]))
            .unwrap();
        assert!(
            render.cmds.iter().any(|c| matches!(c, RecordedCmd::Clear { .. })),
            "color clear recorded"
        );
        let _ = store
            .signal_after_write(&mut render, access, &mut Tracer::none())
            .unwrap();
    }
}
