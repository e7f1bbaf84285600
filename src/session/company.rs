use std::sync::Arc;

use tokio::sync::watch;

use crate::session::engine::SessionEngine;
use crate::types::{Company, CompanyId};

/// Company name and id for UI headers and indicators.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyContextInfo {
    pub name: String,
    pub id: CompanyId,
}

/// Read layer over the selected-company state.
///
/// A thin view for components that only care about the company context —
/// company-scoped screens, guards, the header indicator. Obtained from
/// [`AuthService::company_context`](crate::AuthService::company_context);
/// selection changes go through
/// [`AuthService::select_company`](crate::AuthService::select_company).
#[derive(Clone)]
pub struct CompanyContext {
    engine: Arc<SessionEngine>,
}

impl CompanyContext {
    pub(crate) fn from_engine(engine: Arc<SessionEngine>) -> Self {
        Self { engine }
    }

    /// Currently selected company plus every subsequent change.
    #[must_use]
    pub fn selected_company(&self) -> watch::Receiver<Option<Company>> {
        self.engine.company_tx.subscribe()
    }

    /// Snapshot of the currently selected company.
    #[must_use]
    pub fn current_company(&self) -> Option<Company> {
        self.engine.company_tx.borrow().clone()
    }

    /// Id of the currently selected company.
    #[must_use]
    pub fn current_company_id(&self) -> Option<CompanyId> {
        self.engine.company_tx.borrow().as_ref().map(|company| company.id)
    }

    /// Whether a company is selected — company-scoped screens require it.
    #[must_use]
    pub fn has_selected_company(&self) -> bool {
        self.engine.company_tx.borrow().is_some()
    }

    /// Candidate companies persisted at login, or empty.
    #[must_use]
    pub fn available_companies(&self) -> Vec<Company> {
        self.engine.available_companies()
    }

    /// Whether the signed-in user can switch between companies.
    #[must_use]
    pub fn has_multiple_companies(&self) -> bool {
        self.available_companies().len() > 1
    }

    /// Display info for the selected company, if any.
    #[must_use]
    pub fn context_info(&self) -> Option<CompanyContextInfo> {
        self.engine
            .company_tx
            .borrow()
            .as_ref()
            .map(|company| CompanyContextInfo { name: company.name.clone(), id: company.id })
    }
}

#[cfg(test)]
mod tests {
    use crate::session::testing::harness;
    use crate::store::keys;
    use crate::store::SessionStore;
    use crate::types::{Company, CompanyId};

    fn company(id: i64, name: &str) -> Company {
        Company { id: CompanyId(id), name: name.into(), email: format!("ops@{name}.test") }
    }

    #[test]
    fn empty_until_a_company_is_selected() {
        let h = harness();
        let context = h.service.company_context();

        assert!(!context.has_selected_company());
        assert_eq!(context.current_company_id(), None);
        assert_eq!(context.context_info(), None);
        assert!(context.available_companies().is_empty());
        assert!(!context.has_multiple_companies());
    }

    #[test]
    fn reflects_selection_and_candidate_list() {
        let h = harness();
        let context = h.service.company_context();

        let companies = vec![company(1, "acme"), company(2, "globex")];
        h.store.write(keys::COMPANY_LIST, &serde_json::to_string(&companies).unwrap());
        h.service.select_company(&companies[1]);

        assert!(context.has_selected_company());
        assert_eq!(context.current_company_id(), Some(CompanyId(2)));
        assert_eq!(context.context_info().unwrap().name, "globex");
        assert_eq!(context.available_companies().len(), 2);
        assert!(context.has_multiple_companies());
    }

    #[test]
    fn subscription_sees_the_current_value_immediately() {
        let h = harness();
        h.service.select_company(&company(3, "initech"));

        let receiver = h.service.company_context().selected_company();
        assert_eq!(receiver.borrow().as_ref().map(|c| c.id), Some(CompanyId(3)));
    }
}
