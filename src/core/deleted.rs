//! Purpose: Two-phase deletion: flag rows, recall them, and compact with `pack`.
//! Exports: `Table` methods only.
//! Role: Row-level flag toggles plus physical sweeps over the deletion bits.
//! Invariants: Sweeps run in physical order and put the caller's cursor and ordering back.
//! Invariants: `pack` is not safe while other handles read the same table.
use crate::core::cursor::Position;
use crate::core::error::Error;
use crate::core::table::Table;

impl Table {
    /// False when closed or not positioned; engine errors read as "not deleted".
    pub fn is_deleted(&self) -> bool {
        let Ok(state) = self.state() else {
            return false;
        };
        let Some(recno) = state.cursor.recno() else {
            return false;
        };
        state.store().is_deleted(recno).unwrap_or(false)
    }

    pub fn delete(&mut self) -> Result<(), Error> {
        self.set_current_deleted(true)
    }

    pub fn recall(&mut self) -> Result<(), Error> {
        self.set_current_deleted(false)
    }

    fn set_current_deleted(&mut self, deleted: bool) -> Result<(), Error> {
        self.state()?;
        self.check_writable()?;
        let state = self.state_mut()?;
        let recno = state.cursor.require_row()?;
        state
            .store
            .set_deleted(recno, deleted)
            .map_err(|err| err.with_recno(recno))?;
        tracing::debug!(recno, deleted, "toggled deletion flag");
        Ok(())
    }

    /// Drops every flagged row and rebuilds indexes; the cursor ends at BOF.
    pub fn pack(&mut self) -> Result<u32, Error> {
        self.state()?;
        self.check_writable()?;
        let state = self.state_mut()?;
        let removed = state.store.pack()?;
        state.header.record_count = state.store.record_count();
        state.cursor.set_position(Position::Bof);
        tracing::info!(removed, remaining = state.header.record_count, "packed table");
        Ok(removed)
    }

    pub fn count_deleted(&mut self) -> Result<u32, Error> {
        let mut count = 0;
        self.for_each_deleted(|_, _| {
            count += 1;
            Ok::<(), Error>(())
        })?;
        Ok(count)
    }

    pub fn count_active(&mut self) -> Result<u32, Error> {
        let mut count = 0;
        self.scan_physical(|table, _| {
            if !table.is_deleted() {
                count += 1;
            }
            Ok::<(), Error>(())
        })?;
        Ok(count)
    }

    /// Record numbers of flagged rows, ascending.
    pub fn list_deleted(&mut self) -> Result<Vec<u32>, Error> {
        let mut recnos = Vec::new();
        self.for_each_deleted(|_, recno| {
            recnos.push(recno);
            Ok::<(), Error>(())
        })?;
        Ok(recnos)
    }

    /// Calls `visit` with the table positioned on each flagged row. An error from `visit`
    /// stops the sweep and is returned as is.
    pub fn for_each_deleted<E, F>(&mut self, mut visit: F) -> Result<(), E>
    where
        E: From<Error>,
        F: FnMut(&mut Table, u32) -> Result<(), E>,
    {
        self.scan_physical(|table, recno| {
            if table.is_deleted() {
                visit(table, recno)?;
            }
            Ok(())
        })
    }

    /// Clears every deletion flag; returns how many rows were recalled.
    pub fn recall_all_deleted(&mut self) -> Result<u32, Error> {
        self.state()?;
        self.check_writable()?;
        let mut recalled = 0;
        self.for_each_deleted(|table, _| {
            table.recall()?;
            recalled += 1;
            Ok::<(), Error>(())
        })?;
        tracing::info!(recalled, "recalled deleted rows");
        Ok(recalled)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::error::{Error, ErrorKind};
    use crate::core::memory::MemoryStore;
    use crate::core::table::{OpenOptions, Table};
    use serde_json::json;

    fn three_rows() -> Table {
        let store = MemoryStore::from_value(json!({
            "columns": [{"name": "NAME", "type": "C", "width": 6}],
            "rows": [
                {"values": {"NAME": "one"}},
                {"values": {"NAME": "two"}},
                {"values": {"NAME": "three"}}
            ],
            "indexes": [{"name": "NAME", "column": "NAME"}]
        }))
        .expect("fixture");
        Table::from_store(Box::new(store)).expect("open")
    }

    #[test]
    fn delete_recall_round_trip() {
        let mut table = three_rows();
        assert!(!table.is_deleted());
        assert_eq!(table.delete().expect_err("bof").kind(), ErrorKind::NotPositioned);

        table.goto(2).expect("goto");
        table.delete().expect("delete");
        assert!(table.is_deleted());
        table.recall().expect("recall");
        assert!(!table.is_deleted());

        table.close().expect("close");
        assert!(!table.is_deleted());
        assert_eq!(table.delete().expect_err("closed").kind(), ErrorKind::NotOpen);
        assert_eq!(table.pack().expect_err("closed").kind(), ErrorKind::NotOpen);
    }

    #[test]
    fn three_row_scenario() {
        let mut table = three_rows();
        table.goto(2).expect("goto");
        table.delete().expect("delete");

        table.goto(3).expect("goto");
        assert_eq!(table.count_deleted().expect("deleted"), 1);
        assert_eq!(table.count_active().expect("active"), 2);
        assert_eq!(table.list_deleted().expect("list"), vec![2]);
        assert_eq!(table.position(), 3);

        assert_eq!(table.pack().expect("pack"), 1);
        assert!(table.is_bof());
        assert_eq!(table.record_count().expect("count"), 2);
        assert_eq!(table.header().expect("header").record_count, 2);
        assert_eq!(table.count_deleted().expect("deleted"), 0);

        table.first().expect("first");
        assert_eq!(table.field(0).expect("f").as_string().expect("s"), "one");
        table.next().expect("next");
        assert_eq!(table.field(0).expect("f").as_string().expect("s"), "three");

        let tag = table.default_tag().expect("tag");
        table.select_tag(Some(&tag)).expect("select");
        table.last().expect("last");
        assert_eq!(table.field(0).expect("f").as_string().expect("s"), "three");
    }

    #[test]
    fn sweeps_restore_ordering_and_position() {
        let mut table = three_rows();
        table.goto(1).expect("goto");
        table.delete().expect("delete");
        table.goto(3).expect("goto");
        table.delete().expect("delete");

        let tag = table.default_tag().expect("tag");
        table.select_tag(Some(&tag)).expect("select");
        table.goto(2).expect("goto");

        assert_eq!(table.list_deleted().expect("list"), vec![1, 3]);
        assert_eq!(table.position(), 2);
        assert_eq!(table.selected_tag().map(|t| t.name().to_string()), Some("NAME".into()));

        let mut seen = Vec::new();
        let result = table.for_each_deleted(|_, recno| {
            seen.push(recno);
            Err(Error::new(ErrorKind::Internal).with_message("stop"))
        });
        assert_eq!(result.expect_err("aborted").message(), Some("stop"));
        assert_eq!(seen, vec![1]);
        assert_eq!(table.position(), 2);
        assert!(table.selected_tag().is_some());

        assert_eq!(table.recall_all_deleted().expect("recall all"), 2);
        assert_eq!(table.count_deleted().expect("deleted"), 0);
        assert_eq!(table.position(), 2);
    }

    #[test]
    fn read_only_refuses_mutation() {
        let store = MemoryStore::from_value(json!({
            "columns": [{"name": "A", "type": "C", "width": 1}],
            "rows": [{"deleted": true, "values": {"A": "x"}}]
        }))
        .expect("fixture");
        let mut table = Table::default();
        table.set_options(OpenOptions::new().with_read_only(true));
        table.open_store(Box::new(store)).expect("open");
        table.first().expect("first");
        assert!(table.is_deleted());
        assert_eq!(table.recall().expect_err("read only").kind(), ErrorKind::Usage);
        assert_eq!(table.pack().expect_err("read only").kind(), ErrorKind::Usage);
        assert_eq!(table.recall_all_deleted().expect_err("read only").kind(), ErrorKind::Usage);
        assert_eq!(table.count_deleted().expect("count"), 1);
    }
}
