
use itertools::Itertools;
use std::fmt::Write as _;

use super::Language;
use crate::memory::{Role, Turn};
use crate::retrieval::RetrievalResult;

/// Fixed wording for one answer language
struct Template {
    instructions: &'static str,
    context_label: &'static str,
    history_label: &'static str,
    question_label: &'static str,
    answer_label: &'static str,
    user_label: &'static str,
    assistant_label: &'static str,
    empty_context: &'static str,
    empty_history: &'static str,
    condense_instructions: &'static str,
    follow_up_label: &'static str,
    standalone_label: &'static str,
}

const NOT_FOUND_PLACEHOLDER: &str = "{not_found}";

const FRENCH: Template = Template {
    instructions: "Vous êtes un assistant spécialisé dans la santé mentale au Maroc.\n\
        Utilisez uniquement les informations de contexte ci-dessous pour répondre de manière concise à la question de l'utilisateur.\n\
        Si le contexte ne contient pas la réponse, dites-le explicitement en répondant : \"{not_found}\"\n\
        N'inventez rien.\n\
        Répondez toujours en français.",
    context_label: "Contexte",
    history_label: "Historique de la conversation",
    question_label: "Question",
    answer_label: "Réponse",
    user_label: "Utilisateur",
    assistant_label: "Assistant",
    empty_context: "(aucun document pertinent)",
    empty_history: "(aucun échange précédent)",
    condense_instructions: "Étant donné l'historique de la conversation et une question de suivi, \
        reformulez la question de suivi en une question autonome, compréhensible sans l'historique.\n\
        Ne répondez pas à la question. Répondez uniquement par la question reformulée.",
    follow_up_label: "Question de suivi",
    standalone_label: "Question autonome",
};

const ENGLISH: Template = Template {
    instructions: "You are an assistant specialized in mental health in Morocco.\n\
        Use only the context information below to answer the user's question concisely.\n\
        If the context does not contain the answer, say so explicitly by replying: \"{not_found}\"\n\
        Do not make anything up.\n\
        Always answer in English.",
    context_label: "Context",
    history_label: "Conversation history",
    question_label: "Question",
    answer_label: "Answer",
    user_label: "User",
    assistant_label: "Assistant",
    empty_context: "(no relevant documents)",
    empty_history: "(no previous exchanges)",
    condense_instructions: "Given the conversation history and a follow-up question, \
        rephrase the follow-up question as a standalone question that can be understood without the history.\n\
        Do not answer the question. Reply with the rephrased question only.",
    follow_up_label: "Follow-up question",
    standalone_label: "Standalone question",
};

const ARABIC: Template = Template {
    instructions: "أنت مساعد متخصص في الصحة النفسية في المغرب.\n\
        استخدم فقط معلومات السياق أدناه للإجابة بإيجاز عن سؤال المستخدم.\n\
        إذا لم يتضمن السياق الإجابة، فصرّح بذلك بالرد: \"{not_found}\"\n\
        لا تختلق أي معلومة.\n\
        أجب دائمًا باللغة العربية.",
    context_label: "السياق",
    history_label: "سجل المحادثة",
    question_label: "السؤال",
    answer_label: "الإجابة",
    user_label: "المستخدم",
    assistant_label: "المساعد",
    empty_context: "(لا توجد وثائق ذات صلة)",
    empty_history: "(لا توجد محادثات سابقة)",
    condense_instructions: "بالنظر إلى سجل المحادثة وسؤال المتابعة، \
        أعد صياغة سؤال المتابعة كسؤال مستقل يمكن فهمه دون السجل.\n\
        لا تجب عن السؤال. اكتفِ بالسؤال المعاد صياغته.",
    follow_up_label: "سؤال المتابعة",
    standalone_label: "السؤال المستقل",
};

const fn template(language: Language) -> &'static Template {
    match language {
        Language::French => &FRENCH,
        Language::English => &ENGLISH,
        Language::Arabic => &ARABIC,
    }
}

/// Builds the four-section prompt: instructions, context, history, question
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    not_found_override: Option<String>,
}

impl PromptBuilder {
    /// `not_found_phrase` replaces the per-language default when set
    #[inline]
    pub fn new(not_found_phrase: Option<String>) -> Self {
        Self {
            not_found_override: not_found_phrase
                .map(|phrase| phrase.trim().to_string())
                .filter(|phrase| !phrase.is_empty()),
        }
    }

    #[inline]
    pub fn not_found_phrase(&self, language: Language) -> &str {
        self.not_found_override
            .as_deref()
            .unwrap_or_else(|| language.not_found_phrase())
    }

    pub fn build(
        &self,
        question: &str,
        retrieved: &RetrievalResult,
        history: &[Turn],
        language: Language,
    ) -> String {
        let template = template(language);
        let mut prompt = template
            .instructions
            .replace(NOT_FOUND_PLACEHOLDER, self.not_found_phrase(language));

        let _ = write!(prompt, "\n\n{}:\n", template.context_label);
        if retrieved.is_empty() {
            prompt.push_str(template.empty_context);
        } else {
            prompt.push_str(&retrieved.texts().join("\n\n"));
        }

        let _ = write!(prompt, "\n\n{}:\n", template.history_label);
        write_history(&mut prompt, template, history);

        let _ = write!(
            prompt,
            "\n\n{}: {}\n{}:",
            template.question_label,
            question.trim(),
            template.answer_label
        );

        prompt
    }

    /// Prompt asking the model to turn a follow-up into a standalone question
    pub fn build_condense(&self, question: &str, history: &[Turn], language: Language) -> String {
        let template = template(language);
        let mut prompt = template.condense_instructions.to_string();

        let _ = write!(prompt, "\n\n{}:\n", template.history_label);
        write_history(&mut prompt, template, history);

        let _ = write!(
            prompt,
            "\n\n{}: {}\n{}:",
            template.follow_up_label,
            question.trim(),
            template.standalone_label
        );

        prompt
    }
}

fn write_history(prompt: &mut String, template: &Template, history: &[Turn]) {
    if history.is_empty() {
        prompt.push_str(template.empty_history);
        return;
    }

    let lines = history.iter().format_with("\n", |turn, f| {
        let speaker = match turn.role {
            Role::User => template.user_label,
            Role::Assistant => template.assistant_label,
        };
        f(&format_args!("{}: {}", speaker, turn.text))
    });
    let _ = write!(prompt, "{lines}");
}
