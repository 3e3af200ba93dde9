//! The slotted page layout.
//!
//! A page image is `PAGE_SIZE` bytes: an occupancy bitmap, then
//! `num_slots` fixed-width tuple slots, then zero padding. Slot `k` is
//! tracked by bit `k % 8` of header byte `k / 8`, least significant bit
//! first; a set bit means the slot holds a tuple.

use std::sync::Arc;

use crate::error::DbError;
use crate::transaction::TransactionId;
use crate::tuple::{Schema, Tuple};
use crate::{PageId, RecordId, PAGE_SIZE};

#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    schema: Arc<Schema>,
    num_slots: usize,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    empty_slots: Vec<usize>,
    before_image: Vec<u8>,
    dirty: Option<TransactionId>,
}

impl HeapPage {
    /// Number of tuple slots a page holds for the given schema:
    /// `floor(PAGE_SIZE * 8 / (tuple_size * 8 + 1))`, since each slot
    /// costs its payload plus one header bit.
    pub fn num_slots_for(schema: &Schema) -> usize {
        PAGE_SIZE * 8 / (schema.byte_size() * 8 + 1)
    }

    fn header_size(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    /// An all-zero page image, used when extending a heap file.
    pub fn empty_page_data() -> Vec<u8> {
        vec![0; PAGE_SIZE]
    }

    /// Parses a page from its on-disk image. The resulting page's
    /// before-image is the parsed state.
    pub fn new(pid: PageId, data: &[u8], schema: Arc<Schema>) -> Result<Self, DbError> {
        if data.len() != PAGE_SIZE {
            return Err(DbError::InvalidArgument(format!(
                "page image must be {} bytes, got {}",
                PAGE_SIZE,
                data.len()
            )));
        }

        let tuple_size = schema.byte_size();
        let num_slots = Self::num_slots_for(&schema);
        let header_size = Self::header_size(num_slots);
        let header = data[..header_size].to_vec();

        let mut page = Self {
            pid,
            schema: Arc::clone(&schema),
            num_slots,
            header,
            tuples: vec![None; num_slots],
            empty_slots: Vec::new(),
            before_image: Vec::new(),
            dirty: None,
        };

        for slot in 0..num_slots {
            if !page.is_slot_used(slot) {
                page.empty_slots.push(slot);
                continue;
            }
            let mut offset = header_size + slot * tuple_size;
            let mut tuple = Tuple::new(Arc::clone(&schema));
            for i in 0..schema.num_fields() {
                let ft = schema.field_type(i)?;
                let field = ft.parse(&data[offset..offset + ft.len()])?;
                tuple.set_field(i, field)?;
                offset += ft.len();
            }
            tuple.set_record_id(Some(RecordId::new(pid, slot as u16)));
            page.tuples[slot] = Some(tuple);
        }

        page.set_before_image();
        Ok(page)
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn num_empty_slots(&self) -> usize {
        self.empty_slots.len()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.header[slot / 8] >> (slot % 8) & 1 == 1
    }

    fn mark_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.header[slot / 8] |= mask;
        } else {
            self.header[slot / 8] &= !mask;
        }
    }

    /// Serializes the page. Passing the result back to `HeapPage::new`
    /// yields an equal page.
    pub fn page_data(&self) -> Vec<u8> {
        let tuple_size = self.schema.byte_size();
        let mut out = Vec::with_capacity(PAGE_SIZE);
        out.extend_from_slice(&self.header);

        for slot in 0..self.num_slots {
            match &self.tuples[slot] {
                Some(tuple) => {
                    for i in 0..self.schema.num_fields() {
                        match tuple.field(i) {
                            Some(field) => field.serialize_into(&mut out),
                            None => {
                                let width = self
                                    .schema
                                    .field_type(i)
                                    .map(|ft| ft.len())
                                    .unwrap_or(0);
                                out.resize(out.len() + width, 0);
                            }
                        }
                    }
                }
                None => out.resize(out.len() + tuple_size, 0),
            }
        }

        out.resize(PAGE_SIZE, 0);
        out
    }

    /// Stores the tuple in a free slot, stamping its record id. The
    /// tuple's schema is reset to the page's schema first.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> Result<(), DbError> {
        tuple
            .reset_schema(Arc::clone(&self.schema))
            .map_err(|_| DbError::Storage("tuple does not match the table schema".into()))?;
        for i in 0..self.schema.num_fields() {
            if tuple.field(i).is_none() {
                return Err(DbError::InvalidArgument(format!(
                    "cannot store a tuple with unset field {}",
                    i
                )));
            }
        }

        let slot = self
            .empty_slots
            .pop()
            .ok_or_else(|| DbError::Storage("page is full".into()))?;
        tuple.set_record_id(Some(RecordId::new(self.pid, slot as u16)));
        self.mark_slot_used(slot, true);
        self.tuples[slot] = Some(tuple);
        Ok(())
    }

    /// Removes the tuple named by `tuple`'s record id and clears the id.
    pub fn delete_tuple(&mut self, tuple: &mut Tuple) -> Result<(), DbError> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| DbError::Storage("tuple is not stored on any page".into()))?;
        if rid.page_id() != self.pid {
            return Err(DbError::Storage("tuple is not on this page".into()));
        }
        let slot = rid.slot() as usize;
        if slot >= self.num_slots {
            return Err(DbError::Storage(format!(
                "slot {} out of range for page of {} slots",
                slot, self.num_slots
            )));
        }
        if !self.is_slot_used(slot) {
            return Err(DbError::Storage("slot is already empty".into()));
        }

        self.mark_slot_used(slot, false);
        self.tuples[slot] = None;
        self.empty_slots.push(slot);
        tuple.set_record_id(None);
        Ok(())
    }

    /// Occupied tuples in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().filter_map(|t| t.as_ref())
    }

    /// The page as of the last `set_before_image`.
    pub fn before_image(&self) -> Result<HeapPage, DbError> {
        HeapPage::new(self.pid, &self.before_image, Arc::clone(&self.schema))
    }

    pub fn set_before_image(&mut self) {
        self.before_image = self.page_data();
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirty = tid;
    }

    /// The transaction that last dirtied this page, or `None` if clean.
    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirty
    }
}
