// Single movable cursor over physical or index order, with BOF/EOF re-derived after every move.
use crate::core::error::{Error, ErrorKind};
use crate::core::store::RowStore;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Position {
    Bof,
    Eof,
    Row(u32),
}

/// Traversal order the cursor moves in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Order {
    Physical,
    Index(usize),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cursor {
    position: Position,
    order: Order,
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl Cursor {
    pub fn new() -> Self {
        Self {
            position: Position::Bof,
            order: Order::Physical,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn recno(&self) -> Option<u32> {
        match self.position {
            Position::Row(recno) => Some(recno),
            _ => None,
        }
    }

    /// Current row number, or the positioning error a row-level read should report.
    pub fn require_row(&self) -> Result<u32, Error> {
        match self.position {
            Position::Row(recno) => Ok(recno),
            Position::Bof => Err(Error::at_bof()),
            Position::Eof => Err(Error::at_eof()),
        }
    }

    pub(crate) fn set_order(&mut self, order: Order) {
        self.order = order;
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub(crate) fn first(&mut self, store: &dyn RowStore) -> Result<(), Error> {
        self.land(store, 0)
    }

    pub(crate) fn last(&mut self, store: &dyn RowStore) -> Result<(), Error> {
        let len = self.len(store)? as i64;
        self.land(store, len - 1)
    }

    pub(crate) fn skip(&mut self, store: &dyn RowStore, count: i64) -> Result<(), Error> {
        let len = self.len(store)? as i64;
        let rank = match self.position {
            Position::Bof => -1,
            Position::Eof => len,
            Position::Row(recno) => match self.rank_of(store, recno)? {
                Some(rank) => rank as i64,
                // The row vanished underneath us; treat it as past the end.
                None => len,
            },
        };
        self.land(store, rank.saturating_add(count))
    }

    /// Physical jump; ignores the active order.
    pub(crate) fn goto(&mut self, store: &dyn RowStore, recno: i64) -> Result<(), Error> {
        if recno <= 0 {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("invalid record number {recno} (must be > 0)")));
        }
        let count = store.record_count() as i64;
        if recno > count {
            self.position = Position::Eof;
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("record {recno} is beyond the last record ({count})")));
        }
        self.position = Position::Row(recno as u32);
        Ok(())
    }

    fn len(&self, store: &dyn RowStore) -> Result<usize, Error> {
        match self.order {
            Order::Physical => Ok(store.record_count() as usize),
            Order::Index(slot) => store.index_len(slot),
        }
    }

    fn rank_of(&self, store: &dyn RowStore, recno: u32) -> Result<Option<usize>, Error> {
        match self.order {
            Order::Physical => Ok((recno >= 1 && recno <= store.record_count())
                .then(|| recno as usize - 1)),
            Order::Index(slot) => store.index_position_of(slot, recno),
        }
    }

    fn land(&mut self, store: &dyn RowStore, rank: i64) -> Result<(), Error> {
        let len = self.len(store)? as i64;
        self.position = if rank < 0 {
            Position::Bof
        } else if rank >= len {
            Position::Eof
        } else {
            let recno = match self.order {
                Order::Physical => rank as u32 + 1,
                Order::Index(slot) => store.index_entry(slot, rank as usize)?,
            };
            Position::Row(recno)
        };
        Ok(())
    }
}
